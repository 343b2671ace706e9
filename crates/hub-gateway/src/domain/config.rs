//! Hub configuration with validation.
//!
//! `HubConfig` is assembled once by `HubConfigBuilder` from three layers
//! (defaults, an environment map, command-line overrides) plus optional banner
//! text, then shared read-only as `Arc<HubConfig>`. The builder never reads
//! the process environment itself.
//!
//! Flags win over the environment, except `ELASTIC_HOST` and `ELASTIC_PORT`,
//! which are applied last and override `--eshost` / `--esport`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Protocol version reported by `hub_version`.
pub const HUB_PROTOCOL_VERSION: &str = "0.107.0";
pub const PROTOCOL_MIN: &str = "0.54.0";
pub const PROTOCOL_MAX: &str = "0.199.0";

pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_NOTIFIER_PORT: u16 = 18080;
pub const DEFAULT_JSONRPC_PORT: u16 = 50001;
pub const DEFAULT_ES_HOST: &str = "http://localhost";
pub const DEFAULT_ES_PORT: u16 = 9200;
pub const DEFAULT_ES_INDEX: &str = "claims";

/// Process-wide hub configuration. Immutable after `build()`.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub notifier: NotifierConfig,
    pub jsonrpc: JsonRpcConfig,
    /// Storage refresh period.
    pub refresh_delta: Duration,
    pub features: FeaturesConfig,
    pub toggles: Toggles,
    pub channels: ChannelLists,
    pub subscriptions: SubscriptionConfig,
    pub timeouts: TimeoutConfig,
    pub logging: LoggingConfig,
    /// Chain daemon endpoint for transaction submission.
    pub daemon_url: Option<String>,
    pub banner: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            search: SearchConfig::default(),
            notifier: NotifierConfig::default(),
            jsonrpc: JsonRpcConfig::default(),
            refresh_delta: Duration::from_secs(5),
            features: FeaturesConfig::default(),
            toggles: Toggles::default(),
            channels: ChannelLists::default(),
            subscriptions: SubscriptionConfig::default(),
            timeouts: TimeoutConfig::default(),
            logging: LoggingConfig::default(),
            daemon_url: None,
            banner: default_banner(),
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort("rpc port cannot be 0".into()));
        }
        if self.toggles.notifier && self.notifier.port == 0 {
            return Err(ConfigError::InvalidPort("notifier port cannot be 0".into()));
        }
        if self.toggles.notifier && self.notifier.port == self.server.port {
            return Err(ConfigError::DuplicatePorts);
        }
        if self.toggles.jsonrpc {
            for port in [self.jsonrpc.port, self.jsonrpc.http_port].into_iter().flatten() {
                if port == self.server.port
                    || (self.toggles.notifier && port == self.notifier.port)
                {
                    return Err(ConfigError::DuplicatePorts);
                }
            }
        }

        if self.server.max_sessions == 0 {
            return Err(ConfigError::InvalidLimit("max_sessions cannot be 0".into()));
        }
        if self.subscriptions.queue_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "subscription queue capacity cannot be 0".into(),
            ));
        }
        if self.subscriptions.backfill_batch == 0 {
            return Err(ConfigError::InvalidLimit("backfill batch cannot be 0".into()));
        }
        if self.subscriptions.max_headers_per_request == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_headers_per_request cannot be 0".into(),
            ));
        }

        for (name, value) in [
            ("request", self.timeouts.request),
            ("send", self.subscriptions.send_timeout),
            ("session", self.server.session_timeout),
            ("refresh_delta", self.refresh_delta),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout(format!("{} cannot be 0", name)));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    pub fn notifier_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.notifier.port)
    }

    /// Channels to hide from search results, when blocking/filtering is on.
    pub fn censorship(&self) -> Option<hub_types::Censorship> {
        if !self.toggles.blocking_and_filtering {
            return None;
        }
        let censorship = hub_types::Censorship {
            blocked_channels: self.channels.blocking.clone(),
            filtered_channels: self.channels.filtering.clone(),
        };
        (!censorship.is_empty()).then_some(censorship)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Concurrent WebSocket sessions.
    pub max_sessions: usize,
    /// Inactivity timeout before a session is closed.
    pub session_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_sessions: 10_000,
            session_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub es_host: String,
    pub es_port: u16,
    pub es_index: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            es_host: DEFAULT_ES_HOST.to_string(),
            es_port: DEFAULT_ES_PORT,
            es_index: DEFAULT_ES_INDEX.to_string(),
        }
    }
}

impl SearchConfig {
    /// Base URL of the search backend.
    pub fn url(&self) -> String {
        format!("{}:{}", self.es_host.trim_end_matches('/'), self.es_port)
    }
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub port: u16,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_NOTIFIER_PORT,
        }
    }
}

/// Secondary JSON-RPC gateway ports. The gateway itself runs elsewhere; the
/// hub only reserves the ports.
#[derive(Debug, Clone, Default)]
pub struct JsonRpcConfig {
    pub port: Option<u16>,
    pub http_port: Option<u16>,
}

/// Values reported by `hub_features`.
#[derive(Debug, Clone)]
pub struct FeaturesConfig {
    pub chain: String,
    pub genesis_hash: String,
    pub server_version: String,
    pub protocol_min: String,
    pub protocol_max: String,
    pub description: String,
    pub payment_address: String,
    pub donation_address: String,
    pub daily_fee: String,
    pub country: String,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            chain: "mainnet".to_string(),
            genesis_hash: String::new(),
            server_version: HUB_PROTOCOL_VERSION.to_string(),
            protocol_min: PROTOCOL_MIN.to_string(),
            protocol_max: PROTOCOL_MAX.to_string(),
            description: "Herald".to_string(),
            payment_address: String::new(),
            donation_address: String::new(),
            daily_fee: "1.0".to_string(),
            country: "US".to_string(),
        }
    }
}

/// Optional subsystems. All enabled by default.
#[derive(Debug, Clone)]
pub struct Toggles {
    pub search: bool,
    pub federation: bool,
    pub load_peers: bool,
    pub write_peers: bool,
    pub storage_refresh: bool,
    pub blocking_and_filtering: bool,
    pub notifier: bool,
    pub jsonrpc: bool,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            search: true,
            federation: true,
            load_peers: true,
            write_peers: true,
            storage_refresh: true,
            blocking_and_filtering: true,
            notifier: true,
            jsonrpc: true,
        }
    }
}

impl Toggles {
    /// Everything off; used by tests and embedded setups.
    pub fn none() -> Self {
        Self {
            search: false,
            federation: false,
            load_peers: false,
            write_peers: false,
            storage_refresh: false,
            blocking_and_filtering: false,
            notifier: false,
            jsonrpc: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelLists {
    pub blocking: Vec<String>,
    pub filtering: Vec<String>,
}

/// Per-subscriber delivery limits.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Bounded queue per subscriber; a full queue drops the subscriber.
    pub queue_capacity: usize,
    /// Maximum wait for one outbound write to a client socket.
    pub send_timeout: Duration,
    /// Deepest allowed backfill, in blocks behind the tip.
    pub max_backfill: u64,
    /// Headers read from the store per backfill batch.
    pub backfill_batch: usize,
    /// Longest range `hub_getHeaders` returns.
    pub max_headers_per_request: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            send_timeout: Duration::from_secs(5),
            max_backfill: 10_000,
            backfill_batch: 100,
            max_headers_per_request: 2016,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Bound on every collaborator round-trip.
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub debug: bool,
    pub json: bool,
}

/// Configuration errors. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate ports configured")]
    DuplicatePorts,
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

/// Command-line overrides. `None` leaves the lower layer in place.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub es_host: Option<String>,
    pub es_port: Option<u16>,
    pub es_index: Option<String>,
    pub notifier_port: Option<u16>,
    pub jsonrpc_port: Option<u16>,
    pub jsonrpc_http_port: Option<u16>,
    pub max_sessions: Option<usize>,
    pub session_timeout_secs: Option<u64>,
    pub refresh_delta_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub max_backfill: Option<u64>,
    pub chain: Option<String>,
    pub genesis_hash: Option<String>,
    pub description: Option<String>,
    pub payment_address: Option<String>,
    pub donation_address: Option<String>,
    pub daily_fee: Option<String>,
    pub country: Option<String>,
    pub blocking_channel_ids: Vec<String>,
    pub filtering_channel_ids: Vec<String>,
    pub daemon_url: Option<String>,
    pub debug: bool,
    pub json_logs: bool,
    pub disable_search: bool,
    pub disable_federation: bool,
    pub disable_load_peers: bool,
    pub disable_write_peers: bool,
    pub disable_storage_refresh: bool,
    pub disable_blocking_and_filtering: bool,
    pub disable_notifier: bool,
    pub disable_jsonrpc: bool,
}

/// Search backend location taken from the environment.
#[derive(Debug, Clone, Default)]
struct SearchEnv {
    host: Option<String>,
    port: Option<u16>,
}

/// Pure builder for `HubConfig`.
#[derive(Debug, Clone, Default)]
pub struct HubConfigBuilder {
    config: HubConfig,
    search_env: SearchEnv,
    banner: Option<String>,
}

impl HubConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply environment variables from `vars`.
    ///
    /// Recognised: `ELASTIC_HOST`, `ELASTIC_PORT`, `HUB_JSON_LOGS`,
    /// `HUB_DAEMON_URL`. Unknown keys are ignored. The search keys are held
    /// back until `build`.
    pub fn with_env(mut self, vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        if let Some(host) = vars.get("ELASTIC_HOST") {
            self.search_env.host = Some(host.clone());
        }
        if let Some(port) = vars.get("ELASTIC_PORT") {
            let port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "ELASTIC_PORT".into(),
                value: port.clone(),
            })?;
            self.search_env.port = Some(port);
        }
        if let Some(json) = vars.get("HUB_JSON_LOGS") {
            self.config.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = vars.get("HUB_DAEMON_URL") {
            self.config.daemon_url = Some(url.clone());
        }
        Ok(self)
    }

    pub fn with_overrides(mut self, o: CliOverrides) -> Self {
        let c = &mut self.config;
        if let Some(v) = o.host {
            c.server.host = v;
        }
        if let Some(v) = o.port {
            c.server.port = v;
        }
        if let Some(v) = o.es_host {
            c.search.es_host = v;
        }
        if let Some(v) = o.es_port {
            c.search.es_port = v;
        }
        if let Some(v) = o.es_index {
            c.search.es_index = v;
        }
        if let Some(v) = o.notifier_port {
            c.notifier.port = v;
        }
        if o.jsonrpc_port.is_some() {
            c.jsonrpc.port = o.jsonrpc_port;
        }
        if o.jsonrpc_http_port.is_some() {
            c.jsonrpc.http_port = o.jsonrpc_http_port;
        }
        if let Some(v) = o.max_sessions {
            c.server.max_sessions = v;
        }
        if let Some(v) = o.session_timeout_secs {
            c.server.session_timeout = Duration::from_secs(v);
        }
        if let Some(v) = o.refresh_delta_secs {
            c.refresh_delta = Duration::from_secs(v);
        }
        if let Some(v) = o.request_timeout_secs {
            c.timeouts.request = Duration::from_secs(v);
        }
        if let Some(v) = o.queue_capacity {
            c.subscriptions.queue_capacity = v;
        }
        if let Some(v) = o.max_backfill {
            c.subscriptions.max_backfill = v;
        }

        let f = &mut c.features;
        for (slot, value) in [
            (&mut f.chain, o.chain),
            (&mut f.genesis_hash, o.genesis_hash),
            (&mut f.description, o.description),
            (&mut f.payment_address, o.payment_address),
            (&mut f.donation_address, o.donation_address),
            (&mut f.daily_fee, o.daily_fee),
            (&mut f.country, o.country),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }

        if !o.blocking_channel_ids.is_empty() {
            c.channels.blocking = o.blocking_channel_ids;
        }
        if !o.filtering_channel_ids.is_empty() {
            c.channels.filtering = o.filtering_channel_ids;
        }
        if o.daemon_url.is_some() {
            c.daemon_url = o.daemon_url;
        }

        c.logging.debug |= o.debug;
        c.logging.json |= o.json_logs;

        let t = &mut c.toggles;
        t.search &= !o.disable_search;
        t.federation &= !o.disable_federation;
        t.load_peers &= !o.disable_load_peers;
        t.write_peers &= !o.disable_write_peers;
        t.storage_refresh &= !o.disable_storage_refresh;
        t.blocking_and_filtering &= !o.disable_blocking_and_filtering;
        t.notifier &= !o.disable_notifier;
        t.jsonrpc &= !o.disable_jsonrpc;
        self
    }

    /// Banner text, usually the contents of the banner file.
    pub fn banner(mut self, text: Option<String>) -> Self {
        self.banner = text;
        self
    }

    /// Direct access for embedders and tests.
    pub fn configure(mut self, f: impl FnOnce(&mut HubConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> Result<HubConfig, ConfigError> {
        let mut config = self.config;

        if let Some(host) = self.search_env.host {
            config.search.es_host = host;
        }
        if let Some(port) = self.search_env.port {
            config.search.es_port = port;
        }
        if !config.search.es_host.starts_with("http") {
            config.search.es_host = format!("http://{}", config.search.es_host);
        }
        // The secondary gateway port defaults only when neither port is set.
        if config.jsonrpc.port.is_none() && config.jsonrpc.http_port.is_none() {
            config.jsonrpc.port = Some(DEFAULT_JSONRPC_PORT);
        }
        config.banner = self.banner.unwrap_or_else(default_banner);

        config.validate()?;
        Ok(config)
    }
}

fn default_banner() -> String {
    format!("You are connected to an {} server.", HUB_PROTOCOL_VERSION)
}

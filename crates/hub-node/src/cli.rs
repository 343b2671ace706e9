//! Command line.
//!
//! `hub serve` runs the server; `hub search` sends one claim search to a
//! running hub and prints the result.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use hub_gateway::domain::search::IdList;
use hub_gateway::{CliOverrides, SearchRequest};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hub")]
#[command(about = "Chain hub: point queries and live header subscriptions over JSON-RPC")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the hub server
    Serve(ServeArgs),
    /// Claim search against a running hub
    Search(SearchArgs),
}

/// Networks the hub can serve.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    #[value(name = "mainnet")]
    Mainnet,
    #[value(name = "testnet3")]
    Testnet3,
    #[value(name = "regtest")]
    Regtest,
    #[value(name = "testnet")]
    Testnet,
}

impl Chain {
    pub fn as_str(self) -> &'static str {
        match self {
            Chain::Mainnet => "mainnet",
            Chain::Testnet3 => "testnet3",
            Chain::Regtest => "regtest",
            Chain::Testnet => "testnet",
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// RPC host
    #[arg(long = "rpchost")]
    pub host: Option<IpAddr>,

    /// RPC port
    #[arg(long = "rpcport")]
    pub port: Option<u16>,

    /// Elasticsearch host
    #[arg(long = "eshost")]
    pub es_host: Option<String>,

    /// Elasticsearch port
    #[arg(long = "esport")]
    pub es_port: Option<u16>,

    /// Elasticsearch index name
    #[arg(long = "esindex")]
    pub es_index: Option<String>,

    /// Notifier port
    #[arg(long)]
    pub notifier_port: Option<u16>,

    /// JSON-RPC port
    #[arg(long = "json-rpc-port")]
    pub jsonrpc_port: Option<u16>,

    /// JSON-RPC over HTTP port
    #[arg(long = "json-rpc-http-port")]
    pub jsonrpc_http_port: Option<u16>,

    /// Maximum number of concurrent WebSocket sessions
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Session inactivity timeout (seconds)
    #[arg(long)]
    pub session_timeout: Option<u64>,

    /// Storage refresh period (seconds)
    #[arg(long)]
    pub refresh_delta: Option<u64>,

    /// Timeout for each search, store or submitter call (seconds)
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Per-subscriber queue length before it is dropped as a slow consumer
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Deepest allowed subscription backfill, in blocks behind the tip
    #[arg(long)]
    pub max_backfill: Option<u64>,

    /// Chain name reported by hub_features
    #[arg(long, value_enum)]
    pub chain: Option<Chain>,

    /// Genesis hash reported by hub_features
    #[arg(long)]
    pub genesis_hash: Option<String>,

    /// Server description
    #[arg(long = "server-description")]
    pub description: Option<String>,

    /// Payment address
    #[arg(long)]
    pub payment_address: Option<String>,

    /// Donation address
    #[arg(long)]
    pub donation_address: Option<String>,

    /// Daily fee
    #[arg(long)]
    pub daily_fee: Option<String>,

    /// Country this node is running in
    #[arg(long)]
    pub country: Option<String>,

    /// Blocking channel ids
    #[arg(long = "blocking-channel-ids", value_delimiter = ',', num_args = 1..)]
    pub blocking_channel_ids: Vec<String>,

    /// Filtering channel ids
    #[arg(long = "filtering-channel-ids", value_delimiter = ',', num_args = 1..)]
    pub filtering_channel_ids: Vec<String>,

    /// Banner file served by hub_banner
    #[arg(long = "bannerfile")]
    pub banner_file: Option<PathBuf>,

    /// Chain daemon JSON-RPC URL for hub_broadcast
    #[arg(long)]
    pub daemon_url: Option<String>,

    /// Seed the in-memory store with this many synthetic headers
    #[arg(long, default_value_t = 0)]
    pub dev_chain: usize,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Disable Elasticsearch, for running/testing independently
    #[arg(long = "disable-es")]
    pub disable_search: bool,

    /// Disable server federation
    #[arg(long)]
    pub disable_federation: bool,

    /// Disable load peers from disk at startup
    #[arg(long)]
    pub disable_load_peers: bool,

    /// Disable write peers to disk as we learn about them
    #[arg(long)]
    pub disable_write_peers: bool,

    /// Disable periodic storage refresh
    #[arg(long, alias = "disable-rocksdb-refresh")]
    pub disable_storage_refresh: bool,

    /// Disable blocking and filtering of channels
    #[arg(long)]
    pub disable_blocking_and_filtering: bool,

    /// Disable the external notifier listener
    #[arg(long = "disable-start-notifier")]
    pub disable_notifier: bool,

    /// Disable the JSON-RPC endpoint
    #[arg(long = "disable-start-jsonrpc")]
    pub disable_jsonrpc: bool,
}

impl ServeArgs {
    /// Flags as the top configuration layer.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            host: self.host,
            port: self.port,
            es_host: self.es_host.clone(),
            es_port: self.es_port,
            es_index: self.es_index.clone(),
            notifier_port: self.notifier_port,
            jsonrpc_port: self.jsonrpc_port,
            jsonrpc_http_port: self.jsonrpc_http_port,
            max_sessions: self.max_sessions,
            session_timeout_secs: self.session_timeout,
            refresh_delta_secs: self.refresh_delta,
            request_timeout_secs: self.request_timeout,
            queue_capacity: self.queue_capacity,
            max_backfill: self.max_backfill,
            chain: self.chain.map(|chain| chain.as_str().to_string()),
            genesis_hash: self.genesis_hash.clone(),
            description: self.description.clone(),
            payment_address: self.payment_address.clone(),
            donation_address: self.donation_address.clone(),
            daily_fee: self.daily_fee.clone(),
            country: self.country.clone(),
            blocking_channel_ids: self.blocking_channel_ids.clone(),
            filtering_channel_ids: self.filtering_channel_ids.clone(),
            daemon_url: self.daemon_url.clone(),
            debug: self.debug,
            json_logs: self.json_logs,
            disable_search: self.disable_search,
            disable_federation: self.disable_federation,
            disable_load_peers: self.disable_load_peers,
            disable_write_peers: self.disable_write_peers,
            disable_storage_refresh: self.disable_storage_refresh,
            disable_blocking_and_filtering: self.disable_blocking_and_filtering,
            disable_notifier: self.disable_notifier,
            disable_jsonrpc: self.disable_jsonrpc,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Hub JSON-RPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    pub url: String,

    /// Text query
    #[arg(long)]
    pub text: Option<String>,

    /// Claim name
    #[arg(long)]
    pub name: Option<String>,

    /// Claim type
    #[arg(long = "claim_type")]
    pub claim_type: Option<String>,

    /// Claim id
    #[arg(long)]
    pub id: Option<String>,

    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Channel id
    #[arg(long = "channel_id")]
    pub channel_id: Option<String>,

    /// Channel ids
    #[arg(long = "channel_ids", value_delimiter = ',', num_args = 1..)]
    pub channel_ids: Vec<String>,
}

impl SearchArgs {
    pub fn to_request(&self) -> Result<SearchRequest> {
        if self.channel_id.is_some() && !self.channel_ids.is_empty() {
            bail!("cannot specify both --channel_id and --channel_ids");
        }
        Ok(SearchRequest {
            text: self.text.clone(),
            name: self.name.clone(),
            claim_id: self.id.clone(),
            channel_id: self.channel_id.clone(),
            channel_ids: (!self.channel_ids.is_empty())
                .then(|| IdList::Plain(self.channel_ids.clone())),
            author: self.author.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            claim_type: self.claim_type.iter().cloned().collect(),
            ..Default::default()
        })
    }
}

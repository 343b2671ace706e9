//! Node assembly.
//!
//! ## Startup Sequence
//!
//! 1. Build the store (in-memory, optionally seeded with a dev chain)
//! 2. Create the feed, header source and subscription registry
//! 3. Seed the registry tip and start the feed adapter
//! 4. Start storage refresh and the notifier listener, if enabled
//! 5. Serve until shutdown

use crate::adapters::{ChainDaemonSubmitter, ElasticsearchIndex};
use crate::cli::ServeArgs;
use anyhow::{Context, Result};
use hub_feed::{HeaderSource, InMemoryHeaderFeed, NotifierListener, TipPoller};
use hub_gateway::{
    HubConfig, HubConfigBuilder, HubService, QueryRouter, SubscriptionRegistry,
    UpstreamFeedAdapter,
};
use hub_types::{build_chain, ChainStore, HeaderIngest, MemoryChainStore};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Environment variables read at startup.
pub const ENV_KEYS: [&str; 4] = ["ELASTIC_HOST", "ELASTIC_PORT", "HUB_JSON_LOGS", "HUB_DAEMON_URL"];

/// Snapshot of the process environment restricted to `ENV_KEYS`.
pub fn process_env() -> HashMap<String, String> {
    ENV_KEYS
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
        .collect()
}

/// Read the banner file, if one is configured and present.
///
/// A configured but missing file falls back to the default banner.
pub fn read_banner(path: Option<&Path>) -> Result<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text.trim_end().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "banner file not found, using default banner");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("failed to read banner file {}", path.display())),
    }
}

/// Assemble the configuration: defaults, then `env`, then flags. The
/// search host and port from `env` still win over their flags.
pub fn load_config(args: &ServeArgs, env: &HashMap<String, String>) -> Result<HubConfig> {
    let banner = read_banner(args.banner_file.as_deref())?;
    HubConfigBuilder::new()
        .with_env(env)
        .context("invalid environment")?
        .with_overrides(args.overrides())
        .banner(banner)
        .build()
        .context("invalid configuration")
}

/// A wired hub, ready to serve.
pub struct HubNode {
    service: HubService,
    tasks: JoinSet<()>,
}

impl HubNode {
    /// Wire every component. Background tasks start immediately and stop
    /// on the service's shutdown token.
    pub async fn build(config: Arc<HubConfig>, dev_chain: usize) -> Result<Self> {
        let memory = Arc::new(
            MemoryChainStore::with_headers(build_chain(0, dev_chain))
                .context("failed to seed dev chain")?,
        );
        let store: Arc<dyn ChainStore> = memory.clone();

        let feed = Arc::new(InMemoryHeaderFeed::new());
        let source = Arc::new(HeaderSource::new(Arc::clone(&store), Arc::clone(&feed)));
        source.sync().await.context("failed to read store tip")?;

        let registry = Arc::new(SubscriptionRegistry::new(
            Arc::clone(&store),
            config.subscriptions.clone(),
        ));
        let adapter = UpstreamFeedAdapter::new(Arc::clone(&registry), Arc::clone(&store));
        let tip = adapter.seed().await.context("failed to seed registry tip")?;
        info!(tip = ?tip, "registry seeded");

        let mut router =
            QueryRouter::new(Arc::clone(&config), Arc::clone(&registry), Arc::clone(&store));
        if config.toggles.search {
            let index = ElasticsearchIndex::new(&config.search, config.timeouts.request)
                .context("failed to create search client")?;
            info!(url = %index.search_url(), "search enabled");
            router = router.with_search(Arc::new(index));
        }
        if let Some(url) = &config.daemon_url {
            let submitter = ChainDaemonSubmitter::new(url.clone(), config.timeouts.request)
                .context("failed to create daemon client")?;
            info!(%url, "transaction submission enabled");
            router = router.with_submitter(Arc::new(submitter));
        }

        let service = HubService::new(Arc::clone(&config), registry, router);
        let shutdown = service.shutdown_token();
        let mut tasks = JoinSet::new();

        tasks.spawn(adapter.run(feed.subscribe(), shutdown.clone()));

        if config.toggles.storage_refresh {
            let poller = TipPoller::new(Arc::clone(&source), config.refresh_delta);
            tasks.spawn(poller.run(shutdown.clone()));
        }

        if config.toggles.notifier {
            let ingest: Arc<dyn HeaderIngest> = memory;
            let source = Arc::clone(&source);
            let listener = NotifierListener::bind(config.notifier_addr(), ingest, source)
                .await
                .with_context(|| format!("failed to bind notifier on {}", config.notifier_addr()))?;
            tasks.spawn(listener.run(shutdown.clone()));
        }

        Ok(Self { service, tasks })
    }

    pub fn service(&self) -> &HubService {
        &self.service
    }

    /// Serve until the service shuts down, then stop background tasks.
    pub async fn run(mut self) -> Result<()> {
        let result = self.service.start().await.context("hub server failed");
        self.service.shutdown();
        while self.tasks.join_next().await.is_some() {}
        result
    }
}

/// `hub serve`.
pub async fn serve(args: ServeArgs) -> Result<()> {
    let config = load_config(&args, &process_env())?;
    crate::logging::init(&config.logging)?;

    info!("===========================================");
    info!("  Chain Hub v{}", hub_gateway::VERSION);
    info!("===========================================");
    info!(addr = %config.bind_addr(), "configuration loaded");

    let node = HubNode::build(Arc::new(config), args.dev_chain).await?;
    let service = node.service().clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received shutdown signal"),
            Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
        }
        service.shutdown();
    });

    node.run().await
}

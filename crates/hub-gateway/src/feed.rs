//! Bridge from the upstream header feed into the registry.
//!
//! The adapter is the only caller of `SubscriptionRegistry::deliver`. It runs
//! as a single task, so deliveries are serialized. Holes in the feed (a
//! lagged receiver, a header arriving ahead of the tip) are filled from the
//! store before anything later is delivered.

use crate::domain::error::DeliverError;
use crate::registry::SubscriptionRegistry;
use hub_feed::{FeedError, FeedEvent, FeedSubscription};
use hub_types::{ChainHeader, ChainStore, Height, StoreError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub struct UpstreamFeedAdapter {
    registry: Arc<SubscriptionRegistry>,
    store: Arc<dyn ChainStore>,
}

impl UpstreamFeedAdapter {
    pub fn new(registry: Arc<SubscriptionRegistry>, store: Arc<dyn ChainStore>) -> Self {
        Self { registry, store }
    }

    /// Seed the registry tip from the store. Call once before serving.
    pub async fn seed(&self) -> Result<Option<Height>, StoreError> {
        let tip = self.store.tip().await?.map(|h| h.height);
        if let Some(height) = tip {
            self.registry.seed_tip(height);
        }
        Ok(tip)
    }

    /// Deliver one feed header, repairing a gap first if needed.
    ///
    /// Returns how many headers were delivered (0 for a stale header).
    pub async fn handle(&self, header: Arc<ChainHeader>) -> Result<usize, StoreError> {
        match self.registry.deliver(Arc::clone(&header)) {
            Ok(report) => {
                trace!(height = report.height, delivered = report.delivered, "header delivered");
                Ok(1)
            }
            Err(DeliverError::Stale { tip, got }) => {
                trace!(tip, got, "stale header skipped");
                Ok(0)
            }
            Err(DeliverError::Gap { expected, got }) => {
                warn!(expected, got, "feed gap, filling from store");
                let filled = self.catch_up(got - 1).await?;
                match self.registry.deliver(header) {
                    Ok(_) => Ok(filled + 1),
                    Err(DeliverError::Stale { .. }) => Ok(filled),
                    Err(DeliverError::Gap { expected, .. }) => Err(StoreError::NonContiguous {
                        expected,
                        got,
                    }),
                }
            }
        }
    }

    /// Deliver stored headers from the registry tip up to `target`.
    pub async fn catch_up(&self, target: Height) -> Result<usize, StoreError> {
        let batch = self.registry.config().backfill_batch.max(1);
        let mut delivered = 0;
        loop {
            let next = match self.registry.tip_height() {
                Some(tip) => tip + 1,
                None => return Ok(delivered),
            };
            if next > target {
                return Ok(delivered);
            }
            let want = usize::try_from(target - next + 1)
                .unwrap_or(batch)
                .min(batch);
            let headers = self.store.headers(next, want).await?;
            if headers.is_empty() {
                return Err(StoreError::Unavailable(format!(
                    "header {} missing while catching up to {}",
                    next, target
                )));
            }
            for header in headers {
                match self.registry.deliver(Arc::new(header)) {
                    Ok(_) => delivered += 1,
                    Err(DeliverError::Stale { .. }) => {}
                    Err(DeliverError::Gap { expected, got }) => {
                        return Err(StoreError::NonContiguous { expected, got })
                    }
                }
            }
        }
    }

    async fn catch_up_to_store_tip(&self) -> Result<usize, StoreError> {
        match self.store.tip().await? {
            Some(tip) => self.catch_up(tip.height).await,
            None => Ok(0),
        }
    }

    /// Consume `feed` until it closes or `shutdown` fires.
    pub async fn run(self, mut feed: FeedSubscription, shutdown: CancellationToken) {
        info!(tip = ?self.registry.tip_height(), "feed adapter started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = feed.recv() => match event {
                    Ok(FeedEvent::NewHeader(header)) => {
                        let height = header.height;
                        if let Err(e) = self.handle(header).await {
                            warn!(height, error = %e, "failed to deliver header");
                        }
                    }
                    Err(FeedError::Lagged(missed)) => {
                        match self.catch_up_to_store_tip().await {
                            Ok(filled) => debug!(missed, filled, "recovered from feed lag"),
                            Err(e) => warn!(missed, error = %e, "lag recovery failed"),
                        }
                    }
                    Err(FeedError::Closed) => {
                        info!("upstream feed closed");
                        break;
                    }
                },
            }
        }
        info!("feed adapter stopped");
    }
}

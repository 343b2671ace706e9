//! # Header Source
//!
//! The single publisher of the feed. Reads the store tip and publishes every
//! header above the last one it published, in height order.

use crate::events::FeedEvent;
use crate::publisher::{HeaderPublisher, InMemoryHeaderFeed};
use crate::SYNC_BATCH;
use hub_types::{ChainStore, Height, StoreError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct HeaderSource {
    store: Arc<dyn ChainStore>,
    feed: Arc<InMemoryHeaderFeed>,
    /// Held across store reads so concurrent syncs publish in order.
    last_published: Mutex<Option<Height>>,
}

impl HeaderSource {
    /// Source that treats the current store tip as already published.
    pub fn new(store: Arc<dyn ChainStore>, feed: Arc<InMemoryHeaderFeed>) -> Self {
        Self {
            store,
            feed,
            last_published: Mutex::new(None),
        }
    }

    /// Source that will publish everything above `height` on the next sync.
    pub fn starting_after(
        store: Arc<dyn ChainStore>,
        feed: Arc<InMemoryHeaderFeed>,
        height: Height,
    ) -> Self {
        Self {
            store,
            feed,
            last_published: Mutex::new(Some(height)),
        }
    }

    pub fn feed(&self) -> &Arc<InMemoryHeaderFeed> {
        &self.feed
    }

    pub async fn last_published(&self) -> Option<Height> {
        *self.last_published.lock().await
    }

    /// Publish every stored header above the last published height.
    ///
    /// The first sync of a source created with `new` only records the tip.
    /// Returns the number of headers published.
    pub async fn sync(&self) -> Result<usize, StoreError> {
        let mut last = self.last_published.lock().await;
        let Some(tip) = self.store.tip().await? else {
            return Ok(0);
        };

        let Some(mut next) = last.map(|h| h + 1) else {
            info!(height = tip.height, "header source baseline");
            *last = Some(tip.height);
            return Ok(0);
        };

        let mut published = 0;
        while next <= tip.height {
            let want = usize::try_from(tip.height - next + 1)
                .unwrap_or(SYNC_BATCH)
                .min(SYNC_BATCH);
            let batch = self.store.headers(next, want).await?;
            if batch.is_empty() {
                break;
            }
            for header in batch {
                if header.height != next {
                    return Err(StoreError::Corrupt {
                        height: header.height,
                        reason: format!("expected height {}", next),
                    });
                }
                self.feed
                    .publish(FeedEvent::NewHeader(Arc::new(header)))
                    .await;
                *last = Some(next);
                next += 1;
                published += 1;
            }
        }

        if published > 0 {
            debug!(published, tip = tip.height, "header source synced");
        }
        Ok(published)
    }
}

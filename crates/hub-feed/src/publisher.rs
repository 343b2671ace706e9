//! # Feed Publisher
//!
//! Publishing side of the header feed.

use crate::events::FeedEvent;
use crate::subscriber::FeedSubscription;
use crate::DEFAULT_FEED_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing header events.
#[async_trait]
pub trait HeaderPublisher: Send + Sync {
    /// Publish an event, returning the number of subscribers that got it.
    async fn publish(&self, event: FeedEvent) -> usize;

    /// Total events published.
    fn events_published(&self) -> u64;
}

/// In-memory header feed.
///
/// Uses `tokio::sync::broadcast`; a subscriber that falls more than
/// `capacity` events behind sees `FeedError::Lagged`.
pub struct InMemoryHeaderFeed {
    sender: broadcast::Sender<FeedEvent>,
    events_published: AtomicU64,
    capacity: usize,
}

impl InMemoryHeaderFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> FeedSubscription {
        debug!("feed subscription created");
        FeedSubscription::new(self.sender.subscribe())
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryHeaderFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HeaderPublisher for InMemoryHeaderFeed {
    async fn publish(&self, event: FeedEvent) -> usize {
        let height = event.height();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(height, receivers, "header published");
                receivers
            }
            Err(_) => {
                // Nobody listening yet; the store still holds the header.
                debug!(height, "header published with no receivers");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_types::build_chain;
    use std::sync::Arc;

    fn event(height: u64) -> FeedEvent {
        let header = build_chain(height, 1).remove(0);
        FeedEvent::NewHeader(Arc::new(header))
    }

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let feed = InMemoryHeaderFeed::new();
        assert_eq!(feed.publish(event(1)).await, 0);
        assert_eq!(feed.events_published(), 1);
    }

    #[tokio::test]
    async fn test_publish_with_subscribers() {
        let feed = InMemoryHeaderFeed::new();
        let _a = feed.subscribe();
        let _b = feed.subscribe();
        assert_eq!(feed.publish(event(1)).await, 2);
        assert_eq!(feed.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_drop_releases_receiver() {
        let feed = InMemoryHeaderFeed::new();
        {
            let _sub = feed.subscribe();
            assert_eq!(feed.subscriber_count(), 1);
        }
        assert_eq!(feed.subscriber_count(), 0);
    }
}

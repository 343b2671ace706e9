//! # Fan-out Scenarios
//!
//! Registry behaviour with the real feed path in front of it:
//! store append → `HeaderSource::sync` → feed → `UpstreamFeedAdapter` →
//! `SubscriptionRegistry::deliver`.

#[cfg(test)]
mod tests {
    use crate::harness::{TestHub, WAIT};
    use futures::StreamExt;
    use hub_gateway::{HeaderStream, SessionId, SubscriptionError};
    use hub_types::{Height, StoreError};
    use std::sync::Arc;
    use tokio::time::timeout;

    async fn collect_until(mut stream: HeaderStream, target: Height) -> Vec<Height> {
        let mut heights = Vec::new();
        loop {
            let header = timeout(WAIT, stream.next())
                .await
                .expect("stream stalled")
                .expect("stream ended early")
                .expect("stream failed");
            heights.push(header.height);
            if header.height == target {
                return heights;
            }
        }
    }

    fn assert_contiguous(heights: &[Height]) {
        for pair in heights.windows(2) {
            assert_eq!(pair[1], pair[0] + 1, "gap or repeat in {:?}", heights);
        }
    }

    // =========================================================================
    // ORDERING
    // =========================================================================

    /// Subscribers registering while the chain advances see every height from
    /// their start exactly once, whether they begin in backfill or live.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gap_free_across_backfill_seam() {
        let hub = Arc::new(
            TestHub::start_with(200, |c| c.subscriptions.backfill_batch = 7).await,
        );
        let target = 230;

        let advancer = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for _ in 0..30 {
                    hub.advance(1).await;
                }
            })
        };

        let starts = [Some(10), None, Some(150), Some(200), Some(205)];
        let mut readers = Vec::new();
        for start in starts {
            let stream = hub.registry.register(SessionId::new(), start).unwrap();
            readers.push(tokio::spawn(collect_until(stream, target)));
            tokio::task::yield_now().await;
        }

        advancer.await.unwrap();
        for (start, reader) in starts.into_iter().zip(readers) {
            let heights = reader.await.unwrap();
            assert_contiguous(&heights);
            assert_eq!(*heights.last().unwrap(), target);
            if let Some(start) = start {
                assert_eq!(heights[0], start);
            }
        }
    }

    #[tokio::test]
    async fn test_live_subscriber_as_futures_stream() {
        let hub = TestHub::start(40).await;
        let stream = hub.registry.register(SessionId::new(), None).unwrap();
        hub.advance(5).await;

        let heights: Vec<Height> = stream
            .into_stream()
            .take(5)
            .map(|item| item.unwrap().height)
            .collect()
            .await;
        assert_eq!(heights, vec![41, 42, 43, 44, 45]);
        assert!(hub.registry.is_empty());
    }

    // =========================================================================
    // SLOW CONSUMERS
    // =========================================================================

    /// A subscriber that stops reading is dropped without delaying the
    /// subscriber that keeps up.
    #[tokio::test]
    async fn test_slow_consumer_is_isolated() {
        let hub = TestHub::start_with(10, |c| c.subscriptions.queue_capacity = 4).await;
        let mut fast = hub.registry.register(SessionId::new(), None).unwrap();
        let mut slow = hub.registry.register(SessionId::new(), None).unwrap();
        let slow_id = slow.id();

        for expected in 11..=16 {
            hub.advance(1).await;
            let header = timeout(WAIT, fast.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(header.height, expected);
        }

        assert!(hub.registry.contains(fast.id()));
        assert!(!hub.registry.contains(slow_id));

        for expected in 11..=14 {
            let header = timeout(WAIT, slow.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(header.height, expected);
        }
        let err = timeout(WAIT, slow.next()).await.unwrap().unwrap().unwrap_err();
        assert_eq!(err, SubscriptionError::SlowConsumer);
        assert!(slow.next().await.is_none());
    }

    // =========================================================================
    // BACKEND FAILURES
    // =========================================================================

    #[tokio::test]
    async fn test_store_outage_mid_backfill_ends_stream() {
        let hub = TestHub::start_with(100, |c| c.subscriptions.backfill_batch = 10).await;
        let mut stream = hub.registry.register(SessionId::new(), Some(50)).unwrap();
        let id = stream.id();

        for expected in 50..60 {
            let header = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(header.height, expected);
        }

        hub.store.set_offline(true);
        let err = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(err, SubscriptionError::Backfill(StoreError::Unavailable(_))));
        assert!(!hub.registry.contains(id));
        assert!(stream.next().await.is_none());
    }
}

//! # Session Lifecycle
//!
//! Sessions against a live registry: cancellation during backfill and live
//! delivery, close, service shutdown, and reuse of the subscription slot.

#[cfg(test)]
mod tests {
    use crate::harness::{TestHub, WAIT};
    use hub_gateway::{Session, SessionError, SubscriptionError, SubscriptionState};
    use std::sync::Arc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_cancel_mid_backfill_releases_handle() {
        let hub = TestHub::start_with(500, |c| c.subscriptions.backfill_batch = 10).await;
        let session = Session::new(Arc::clone(&hub.registry));
        let mut sub = session.open_subscription(Some(100)).unwrap();

        for expected in 100..105 {
            let header = timeout(WAIT, sub.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(header.height, expected);
        }
        assert_eq!(session.subscription_state(), SubscriptionState::Backfilling);

        assert!(session.cancel_subscription(None));
        assert!(hub.registry.is_empty());
        assert!(timeout(WAIT, sub.next()).await.unwrap().is_none());

        drop(sub);
        assert_eq!(session.subscription_state(), SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_close_while_live() {
        let hub = TestHub::start(20).await;
        let session = Session::new(Arc::clone(&hub.registry));
        let mut sub = session.open_subscription(None).unwrap();

        hub.advance(2).await;
        for expected in 21..=22 {
            let header = timeout(WAIT, sub.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(header.height, expected);
        }
        assert_eq!(session.subscription_state(), SubscriptionState::Live);

        session.close();
        assert!(hub.registry.is_empty());
        assert!(timeout(WAIT, sub.next()).await.unwrap().is_none());
        assert!(matches!(
            session.open_subscription(None),
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_service_shutdown_ends_child_sessions() {
        let hub = TestHub::start(5).await;
        let session = Session::child_of(Arc::clone(&hub.registry), &hub.service.shutdown_token());
        let mut sub = session.open_subscription(None).unwrap();

        hub.service.shutdown();
        assert!(timeout(WAIT, sub.next()).await.unwrap().is_none());
        assert!(session.is_closed());
    }

    /// After a slow-consumer drop the session may subscribe again once the
    /// old subscription is released.
    #[tokio::test]
    async fn test_resubscribe_after_slow_consumer() {
        let hub = TestHub::start_with(30, |c| c.subscriptions.queue_capacity = 2).await;
        let session = Session::new(Arc::clone(&hub.registry));
        let mut sub = session.open_subscription(None).unwrap();

        hub.advance(3).await;
        assert!(hub.registry.is_empty());

        for expected in 31..=32 {
            let header = timeout(WAIT, sub.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(header.height, expected);
        }
        let err = timeout(WAIT, sub.next()).await.unwrap().unwrap().unwrap_err();
        assert_eq!(err, SubscriptionError::SlowConsumer);

        assert!(matches!(
            session.open_subscription(None),
            Err(SessionError::AlreadySubscribed(_))
        ));
        drop(sub);

        let mut sub = session.open_subscription(Some(33)).unwrap();
        let header = timeout(WAIT, sub.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(header.height, 33);
    }

    #[tokio::test]
    async fn test_dropping_session_deregisters() {
        let hub = TestHub::start(8).await;
        let session = Session::new(Arc::clone(&hub.registry));
        let _sub = session.open_subscription(Some(3)).unwrap();
        assert_eq!(hub.registry.len(), 1);

        drop(session);
        assert!(hub.registry.is_empty());
    }
}

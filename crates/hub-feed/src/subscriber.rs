//! # Feed Subscriber
//!
//! Receiving side of the header feed. Unlike a best-effort event bus, a
//! lagged receiver is reported rather than skipped, since the consumer has to
//! repair the hole before fanning out further headers.

use crate::events::FeedEvent;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The receiver fell behind and `0` events were overwritten.
    #[error("feed subscriber lagged by {0} events")]
    Lagged(u64),

    /// All publishers are gone.
    #[error("header feed closed")]
    Closed,
}

/// Handle for receiving feed events.
pub struct FeedSubscription {
    receiver: broadcast::Receiver<FeedEvent>,
}

impl FeedSubscription {
    pub(crate) fn new(receiver: broadcast::Receiver<FeedEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event.
    ///
    /// After `Lagged` the subscription continues from the oldest event still
    /// buffered.
    pub async fn recv(&mut self) -> Result<FeedEvent, FeedError> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Closed) => Err(FeedError::Closed),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(lagged = n, "feed subscriber lagged");
                Err(FeedError::Lagged(n))
            }
        }
    }

    /// Non-blocking receive; `Ok(None)` when nothing is buffered.
    pub fn try_recv(&mut self) -> Result<Option<FeedEvent>, FeedError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(FeedError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(FeedError::Lagged(n)),
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        debug!("feed subscription dropped");
    }
}

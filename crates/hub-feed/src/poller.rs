//! Periodic storage refresh.

use crate::source::HeaderSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Re-reads the store tip every `interval` and publishes anything new.
pub struct TipPoller {
    source: Arc<HeaderSource>,
    interval: Duration,
}

impl TipPoller {
    pub fn new(source: Arc<HeaderSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Run until `shutdown` fires. Store failures are logged and retried on
    /// the next tick.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "tip poller started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.source.sync().await {
                        warn!(error = %e, "storage refresh failed");
                    }
                }
            }
        }
        info!("tip poller stopped");
    }
}

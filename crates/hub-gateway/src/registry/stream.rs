use super::{CloseReason, SubscriptionRegistry};
use crate::domain::error::SubscriptionError;
use crate::domain::ids::SubscriptionId;
use futures::Stream;
use hub_types::{ChainHeader, Height, StoreError};
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

enum StreamPhase {
    /// Reading `[next, end]` from the store in batches.
    Backfilling {
        next: Height,
        end: Height,
        buffer: VecDeque<ChainHeader>,
    },
    Live,
}

/// Ordered header stream for one subscription.
///
/// Yields the backfill range (if any) and then live headers. Live headers at
/// or below the last yielded height are skipped, so the seam never repeats a
/// height. The stream ends with `Err(SlowConsumer)` if the registry dropped
/// it for falling behind, and with `None` after a normal close.
///
/// Dropping the stream deregisters it.
pub struct HeaderStream {
    id: SubscriptionId,
    registry: Arc<SubscriptionRegistry>,
    rx: mpsc::Receiver<Arc<ChainHeader>>,
    closed: Arc<OnceLock<CloseReason>>,
    phase: StreamPhase,
    last_yielded: Option<Height>,
    done: bool,
}

impl HeaderStream {
    pub(super) fn new(
        id: SubscriptionId,
        registry: Arc<SubscriptionRegistry>,
        rx: mpsc::Receiver<Arc<ChainHeader>>,
        closed: Arc<OnceLock<CloseReason>>,
        backfill: Option<(Height, Height)>,
        floor: Option<Height>,
    ) -> Self {
        let phase = match backfill {
            Some((next, end)) => StreamPhase::Backfilling {
                next,
                end,
                buffer: VecDeque::new(),
            },
            None => StreamPhase::Live,
        };
        Self {
            id,
            registry,
            rx,
            closed,
            phase,
            last_yielded: floor,
            done: false,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_backfilling(&self) -> bool {
        matches!(self.phase, StreamPhase::Backfilling { .. })
    }

    /// Next header, `None` once the subscription has ended.
    ///
    /// Cancel-safe in the live phase. In the backfill phase a cancelled call
    /// may lose the batch being read; callers that race this against a
    /// cancellation token stop consuming afterwards anyway.
    pub async fn next(&mut self) -> Option<Result<Arc<ChainHeader>, SubscriptionError>> {
        if self.done {
            return None;
        }
        loop {
            match &mut self.phase {
                StreamPhase::Backfilling { next, end, buffer } => {
                    if let Some(header) = buffer.pop_front() {
                        self.last_yielded = Some(header.height);
                        return Some(Ok(Arc::new(header)));
                    }
                    if *next > *end {
                        self.phase = StreamPhase::Live;
                        self.registry.mark_live(self.id);
                        debug!(subscription_id = %self.id, "backfill complete, now live");
                        continue;
                    }

                    let batch_size = self.registry.config().backfill_batch as u64;
                    let count = (*end - *next + 1).min(batch_size);
                    let batch = match self.registry.store().headers(*next, count as usize).await {
                        Ok(batch) if batch.is_empty() => {
                            let missing = format!("header {} not in store", next);
                            let err = SubscriptionError::Backfill(StoreError::Unavailable(missing));
                            return Some(Err(self.fail(err)));
                        }
                        Ok(batch) => batch,
                        Err(e) => return Some(Err(self.fail(SubscriptionError::Backfill(e)))),
                    };

                    for header in batch {
                        if header.height != *next {
                            let err = SubscriptionError::BackfillGap {
                                expected: *next,
                                got: header.height,
                            };
                            return Some(Err(self.fail(err)));
                        }
                        *next += 1;
                        buffer.push_back(header);
                        if *next > *end {
                            break;
                        }
                    }
                }
                StreamPhase::Live => match self.rx.recv().await {
                    Some(header) => {
                        if self.last_yielded.is_some_and(|last| header.height <= last) {
                            continue;
                        }
                        self.last_yielded = Some(header.height);
                        return Some(Ok(header));
                    }
                    None => {
                        self.done = true;
                        return match self.closed.get() {
                            Some(CloseReason::SlowConsumer) => {
                                Some(Err(SubscriptionError::SlowConsumer))
                            }
                            _ => None,
                        };
                    }
                },
            }
        }
    }

    /// Stop the subscription. Queued headers are discarded.
    pub fn close(&mut self) {
        self.done = true;
        self.registry.deregister(self.id);
        self.rx.close();
    }

    /// Adapt into a `futures::Stream`.
    pub fn into_stream(
        self,
    ) -> impl Stream<Item = Result<Arc<ChainHeader>, SubscriptionError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|item| (item, stream))
        })
    }

    fn fail(&mut self, err: SubscriptionError) -> SubscriptionError {
        warn!(subscription_id = %self.id, error = %err, "header stream failed");
        self.close();
        err
    }
}

impl Drop for HeaderStream {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

impl std::fmt::Debug for HeaderStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderStream")
            .field("id", &self.id)
            .field("backfilling", &self.is_backfilling())
            .field("last_yielded", &self.last_yielded)
            .field("done", &self.done)
            .finish()
    }
}

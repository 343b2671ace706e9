//! # Subscription Registry
//!
//! Owns every live header subscription and fans each new chain-tip header out
//! to all of them.
//!
//! ## Concurrency
//!
//! One `parking_lot::Mutex` guards `{tip, handles}`. `deliver` holds it for a
//! single pass of non-blocking `try_send` calls into each handle's bounded
//! queue, so:
//!
//! - registration and deregistration wait at most one fan-out pass;
//! - a handle removed before `deliver` takes the lock is never visited;
//! - a handle present for the whole call always gets the header (or is
//!   dropped as a slow consumer).
//!
//! `register` snapshots the tip under the same lock that inserts the handle,
//! which is what makes the backfill/live seam gap-free: everything up to the
//! snapshot comes from the store, everything after it arrives on the queue.

mod stream;

pub use stream::HeaderStream;

use crate::domain::config::SubscriptionConfig;
use crate::domain::error::{DeliverError, RegisterError};
use crate::domain::ids::{SessionId, SubscriptionId};
use hub_types::{ChainHeader, ChainStore, Height};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};

/// Why a handle left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit cancel, session close or shutdown.
    Deregistered,
    /// Queue was full at delivery time.
    SlowConsumer,
    /// Receiver was gone at delivery time.
    SinkClosed,
}

/// Delivery phase of one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Backfilling,
    Live,
}

/// Outcome of one `deliver` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub height: Height,
    pub delivered: usize,
    pub dropped: Vec<(SubscriptionId, CloseReason)>,
}

struct HandleEntry {
    tx: mpsc::Sender<Arc<ChainHeader>>,
    closed: Arc<OnceLock<CloseReason>>,
    session: SessionId,
    live: bool,
}

impl HandleEntry {
    fn close(&self, reason: CloseReason) {
        let _ = self.closed.set(reason);
    }
}

#[derive(Default)]
struct RegistryState {
    tip: Option<Height>,
    handles: HashMap<SubscriptionId, HandleEntry>,
    shut_down: bool,
}

pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
    store: Arc<dyn ChainStore>,
    config: SubscriptionConfig,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn ChainStore>, config: SubscriptionConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            store,
            config,
        }
    }

    /// Set the starting tip. Only ever raises it.
    pub fn seed_tip(&self, height: Height) {
        let mut state = self.state.lock();
        if state.tip.map_or(true, |tip| height > tip) {
            info!(height, "registry tip seeded");
            state.tip = Some(height);
        }
    }

    /// Height of the last header accepted by `deliver`.
    pub fn tip_height(&self) -> Option<Height> {
        self.state.lock().tip
    }

    pub fn store(&self) -> &Arc<dyn ChainStore> {
        &self.store
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Register a new handle for `session`.
    ///
    /// With a `start` at or below the tip the stream first yields
    /// `[start, tip]` from the store, then the live tail. Without a start, or
    /// with one above the tip, it joins live directly and skips anything below
    /// `start`.
    pub fn register(
        self: &Arc<Self>,
        session: SessionId,
        start: Option<Height>,
    ) -> Result<HeaderStream, RegisterError> {
        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let closed = Arc::new(OnceLock::new());

        let mut state = self.state.lock();
        if state.shut_down {
            return Err(RegisterError::ShuttingDown);
        }

        let tip = state.tip;
        let backfill = match (start, tip) {
            (Some(start), Some(tip)) if start <= tip => {
                if tip - start > self.config.max_backfill {
                    return Err(RegisterError::BackfillTooDeep {
                        start,
                        tip,
                        max: self.config.max_backfill,
                    });
                }
                Some((start, tip))
            }
            _ => None,
        };
        let floor = match (start, tip) {
            (Some(start), Some(tip)) if start <= tip => Some(tip),
            (Some(start), _) => start.checked_sub(1),
            (None, tip) => tip,
        };

        state.handles.insert(
            id,
            HandleEntry {
                tx,
                closed: Arc::clone(&closed),
                session,
                live: backfill.is_none(),
            },
        );
        let active = state.handles.len();
        drop(state);

        debug!(
            subscription_id = %id,
            session_id = %session,
            start_height = ?start,
            tip = ?tip,
            backfill = backfill.is_some(),
            active,
            "subscription registered"
        );

        Ok(HeaderStream::new(
            id,
            Arc::clone(self),
            rx,
            closed,
            backfill,
            floor,
        ))
    }

    /// Fan `header` out to every registered handle.
    ///
    /// Must be called once per header in height order; a stale or gapped
    /// header is refused without touching any handle. Never blocks on a
    /// subscriber.
    pub fn deliver(&self, header: Arc<ChainHeader>) -> Result<DeliveryReport, DeliverError> {
        let height = header.height;
        let mut state = self.state.lock();

        if let Some(tip) = state.tip {
            if height <= tip {
                return Err(DeliverError::Stale { tip, got: height });
            }
            if height > tip + 1 {
                return Err(DeliverError::Gap {
                    expected: tip + 1,
                    got: height,
                });
            }
        }
        state.tip = Some(height);

        let mut delivered = 0;
        let mut dropped = Vec::new();
        state.handles.retain(|id, entry| {
            match entry.tx.try_send(Arc::clone(&header)) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        subscription_id = %id,
                        session_id = %entry.session,
                        height,
                        "dropping slow consumer"
                    );
                    entry.close(CloseReason::SlowConsumer);
                    dropped.push((*id, CloseReason::SlowConsumer));
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscription_id = %id, "subscriber sink closed");
                    entry.close(CloseReason::SinkClosed);
                    dropped.push((*id, CloseReason::SinkClosed));
                    false
                }
            }
        });
        drop(state);

        trace!(height, delivered, dropped = dropped.len(), "header fanned out");
        Ok(DeliveryReport {
            height,
            delivered,
            dropped,
        })
    }

    /// Remove a handle. Idempotent; returns whether it was present.
    pub fn deregister(&self, id: SubscriptionId) -> bool {
        let removed = self.state.lock().handles.remove(&id);
        match removed {
            Some(entry) => {
                entry.close(CloseReason::Deregistered);
                debug!(
                    subscription_id = %id,
                    session_id = %entry.session,
                    "subscription deregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Remove every handle owned by `session`.
    pub fn deregister_session(&self, session: SessionId) -> usize {
        let mut state = self.state.lock();
        let before = state.handles.len();
        state.handles.retain(|_, entry| {
            if entry.session == session {
                entry.close(CloseReason::Deregistered);
                false
            } else {
                true
            }
        });
        before - state.handles.len()
    }

    /// Drop every handle and refuse new registrations.
    pub fn close_all(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        let count = state.handles.len();
        for (_, entry) in state.handles.drain() {
            entry.close(CloseReason::Deregistered);
        }
        info!(count, "registry closed");
    }

    pub(crate) fn mark_live(&self, id: SubscriptionId) {
        if let Some(entry) = self.state.lock().handles.get_mut(&id) {
            entry.live = true;
        }
    }

    pub fn phase(&self, id: SubscriptionId) -> Option<Phase> {
        self.state.lock().handles.get(&id).map(|entry| {
            if entry.live {
                Phase::Live
            } else {
                Phase::Backfilling
            }
        })
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.state.lock().handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

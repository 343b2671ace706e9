//! Per-connection session state.
//!
//! A `Session` lives exactly as long as its client connection. It owns at most
//! one header subscription at a time and guarantees the registry handle is
//! released on every exit path: explicit unsubscribe, stream end, `close()`,
//! or drop.

use crate::domain::error::{SessionError, SubscriptionError};
use crate::domain::ids::{SessionId, SubscriptionId};
use crate::registry::{HeaderStream, Phase, SubscriptionRegistry};
use chrono::{DateTime, Utc};
use hub_types::{ChainHeader, Height};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Observable subscription sub-state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Backfilling,
    Live,
}

struct ActiveSubscription {
    id: SubscriptionId,
    token: CancellationToken,
}

type Slot = Arc<Mutex<Option<ActiveSubscription>>>;

pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    registry: Arc<SubscriptionRegistry>,
    active: Slot,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self::with_token(registry, CancellationToken::new())
    }

    /// Session that also closes when `parent` is cancelled.
    pub fn child_of(registry: Arc<SubscriptionRegistry>, parent: &CancellationToken) -> Self {
        Self::with_token(registry, parent.child_token())
    }

    fn with_token(registry: Arc<SubscriptionRegistry>, cancel: CancellationToken) -> Self {
        let id = SessionId::new();
        debug!(session_id = %id, "session opened");
        Self {
            id,
            created_at: Utc::now(),
            registry,
            active: Arc::new(Mutex::new(None)),
            cancel,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Token cancelled when the session closes. Per-call work should select
    /// on a child of it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Open the session's header subscription.
    ///
    /// Fails with `AlreadySubscribed` while a previous subscription is still
    /// open; the slot frees when that subscription is cancelled or its
    /// `SessionSubscription` is dropped.
    pub fn open_subscription(
        &self,
        start: Option<Height>,
    ) -> Result<SessionSubscription, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let mut slot = self.active.lock();
        if let Some(active) = slot.as_ref() {
            return Err(SessionError::AlreadySubscribed(active.id));
        }

        let stream = self.registry.register(self.id, start)?;
        let token = self.cancel.child_token();
        *slot = Some(ActiveSubscription {
            id: stream.id(),
            token: token.clone(),
        });

        info!(
            session_id = %self.id,
            subscription_id = %stream.id(),
            start_height = ?start,
            "header subscription opened"
        );

        Ok(SessionSubscription {
            stream,
            token,
            slot: Arc::clone(&self.active),
        })
    }

    /// Cancel the active subscription. With `Some(id)`, only if it matches.
    ///
    /// Deregisters before returning, so no later `deliver` reaches it.
    pub fn cancel_subscription(&self, id: Option<SubscriptionId>) -> bool {
        let mut slot = self.active.lock();
        let matches = match (slot.as_ref(), id) {
            (Some(active), Some(id)) => active.id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return false;
        }
        match slot.take() {
            Some(active) => {
                active.token.cancel();
                self.registry.deregister(active.id);
                debug!(
                    session_id = %self.id,
                    subscription_id = %active.id,
                    "subscription cancelled"
                );
                true
            }
            None => false,
        }
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.active.lock().as_ref().map(|a| a.id)
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        let Some(id) = self.subscription_id() else {
            return SubscriptionState::Unsubscribed;
        };
        match self.registry.phase(id) {
            Some(Phase::Backfilling) => SubscriptionState::Backfilling,
            Some(Phase::Live) => SubscriptionState::Live,
            None => SubscriptionState::Unsubscribed,
        }
    }

    /// Cancel everything and release every registry handle. Idempotent.
    pub fn close(&self) {
        if self.cancel.is_cancelled() && self.active.lock().is_none() {
            return;
        }
        self.cancel.cancel();
        if let Some(active) = self.active.lock().take() {
            self.registry.deregister(active.id);
        }
        let swept = self.registry.deregister_session(self.id);
        debug!(session_id = %self.id, swept, "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// The session's view of its header stream.
///
/// Ends with `None` as soon as the subscription or its session is cancelled.
pub struct SessionSubscription {
    stream: HeaderStream,
    token: CancellationToken,
    slot: Slot,
}

impl SessionSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.stream.id()
    }

    pub async fn next(&mut self) -> Option<Result<Arc<ChainHeader>, SubscriptionError>> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                self.stream.close();
                None
            }
            item = self.stream.next() => item,
        }
    }
}

impl std::fmt::Debug for SessionSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSubscription")
            .field("id", &self.id())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        let id = self.stream.id();
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|active| active.id == id) {
            *slot = None;
        }
    }
}

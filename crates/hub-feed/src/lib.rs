//! # Hub Feed - Upstream Header Events
//!
//! Turns the canonical chain tip into a strictly ordered stream of
//! `FeedEvent::NewHeader` events.
//!
//! ```text
//!  external notifier ──ingest──▶ ChainStore ◀──refresh── TipPoller
//!                                     │
//!                               HeaderSource::sync()
//!                                     │ publish (height order)
//!                                     ▼
//!                            InMemoryHeaderFeed ──▶ FeedSubscription(s)
//! ```
//!
//! `HeaderSource` is the only publisher; it serializes publication so events
//! leave the feed in height order with no gaps.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod notifier;
pub mod poller;
pub mod publisher;
pub mod source;
pub mod subscriber;

pub use events::FeedEvent;
pub use notifier::NotifierListener;
pub use poller::TipPoller;
pub use publisher::{HeaderPublisher, InMemoryHeaderFeed};
pub use source::HeaderSource;
pub use subscriber::{FeedError, FeedSubscription};

/// Events buffered per feed subscriber before it is reported as lagged.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Headers read from the store per batch when catching up.
pub const SYNC_BATCH: usize = 500;

//! # Hub Gateway
//!
//! Request and subscription fan-out layer of the chain hub.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────────────────────┐
//!   POST /  ────▶│  HubService (axum)                           │
//!   GET /ws ────▶│    ├── Session (one per WebSocket)           │
//!                │    │     └── SessionSubscription ◀───┐       │
//!                │    └── QueryRouter ──▶ ChainStore     │       │
//!                │                   ──▶ SearchIndex    │       │
//!                │                   ──▶ TxSubmitter    │       │
//!                │                                      │       │
//!                │  SubscriptionRegistry ── try_send ───┘       │
//!                │          ▲ deliver (serialized)              │
//!                │  UpstreamFeedAdapter ◀── hub-feed            │
//!                └──────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Each subscriber sees headers in strictly increasing height order with no
//!   gap and no repeat, across the backfill-to-live switch.
//! - A subscriber whose queue is full is dropped with a distinguishable
//!   slow-consumer error; fan-out never waits on a subscriber.
//! - No registry handle outlives its session.
//!
//! ## Usage
//!
//! ```ignore
//! use hub_gateway::{HubConfig, HubService, QueryRouter, SubscriptionRegistry};
//!
//! let config = Arc::new(HubConfig::default());
//! let registry = Arc::new(SubscriptionRegistry::new(store.clone(), config.subscriptions.clone()));
//! let router = QueryRouter::new(config.clone(), registry.clone(), store);
//! HubService::new(config, registry, router).start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod feed;
pub mod middleware;
pub mod registry;
pub mod router;
pub mod service;
pub mod session;
pub mod ws;

pub use domain::config::{
    CliOverrides, ConfigError, HubConfig, HubConfigBuilder, SubscriptionConfig,
};
pub use domain::error::{
    codes, ApiError, ApiResult, DeliverError, HubError, RegisterError, SessionError,
    SubscriptionError,
};
pub use domain::ids::{SessionId, SubscriptionId};
pub use domain::methods::{names, HubCall};
pub use domain::search::SearchRequest;
pub use feed::UpstreamFeedAdapter;
pub use registry::{CloseReason, DeliveryReport, HeaderStream, Phase, SubscriptionRegistry};
pub use router::QueryRouter;
pub use service::HubService;
pub use session::{Session, SessionSubscription, SubscriptionState};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

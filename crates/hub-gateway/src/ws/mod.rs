//! WebSocket transport.
//!
//! One connection is one `Session`. Supports every hub method, including
//! `hub_subscribeHeaders` / `hub_unsubscribeHeaders`.

pub mod handler;

pub(crate) use handler::run_session;
pub use handler::DEFAULT_MAX_MESSAGE_SIZE;

//! # Chain Hub Test Suite
//!
//! Cross-crate scenarios that run the real store, feed, registry and service
//! together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # TestHub (ephemeral-port server) and WsClient
//! └── integration/
//!     ├── fanout.rs     # Ordering, backfill seam, slow consumer isolation
//!     ├── sessions.rs   # Session lifecycle and cancellation
//!     └── transport.rs  # End-to-end HTTP and WebSocket
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p hub-tests
//! cargo test -p hub-tests integration::transport::
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod harness;
pub mod integration;

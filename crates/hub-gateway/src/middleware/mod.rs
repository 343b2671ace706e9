//! HTTP middleware stack.
//!
//! Layer order: Request → Tracing → BodyLimit → Handler

pub mod tracing;

pub use self::tracing::{TracingLayer, REQUEST_ID_HEADER};

/// Largest accepted HTTP request body.
pub const MAX_REQUEST_BODY: usize = 1024 * 1024;

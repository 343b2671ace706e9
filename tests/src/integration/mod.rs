//! Cross-crate integration scenarios.

pub mod fanout;
pub mod sessions;
pub mod transport;

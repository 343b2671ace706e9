//! # Error Types
//!
//! Failures reported by the external collaborators. "Not found" is never an
//! error here; lookups return `Ok(None)` instead.

use crate::entities::Height;
use thiserror::Error;

/// Errors from the ledger/chain-state store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store cannot be reached or is refreshing.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Header does not extend the current tip.
    #[error("header at height {got} does not extend tip (expected height {expected})")]
    NonContiguous { expected: Height, got: Height },

    /// Stored data failed validation on read.
    #[error("corrupt record at height {height}: {reason}")]
    Corrupt { height: Height, reason: String },
}

/// Errors from the claim search index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("search backend unavailable: {0}")]
    Unavailable(String),

    /// Backend refused the query shape.
    #[error("invalid search query: {0}")]
    InvalidQuery(String),
}

/// Errors from the transaction submission collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("transaction submitter unavailable: {0}")]
    Unavailable(String),

    /// The network rejected the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

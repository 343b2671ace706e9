//! Hub error types with JSON-RPC 2.0 error codes.
//!
//! Domain errors are `thiserror` enums; every one of them converts into the
//! wire-level `ApiError` so handlers can use `?` all the way to the response.

use crate::domain::ids::SubscriptionId;
use hub_types::{Height, SearchError, StoreError, SubmitError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-RPC error codes.
pub mod codes {
    // JSON-RPC 2.0 standard errors
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Server errors
    pub const RESOURCE_NOT_FOUND: i32 = -32001;
    pub const RESOURCE_UNAVAILABLE: i32 = -32002;
    pub const TRANSACTION_REJECTED: i32 = -32003;
    pub const TIMEOUT: i32 = -32006;

    // Subscription errors
    pub const ALREADY_SUBSCRIBED: i32 = -32020;
    pub const SLOW_CONSUMER: i32 = -32021;
    pub const SUBSCRIPTION_CLOSED: i32 = -32022;
}

/// Wire error carried in a JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn parse_error(details: impl Into<String>) -> Self {
        Self::new(
            codes::PARSE_ERROR,
            format!("Parse error: {}", details.into()),
        )
    }

    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_REQUEST,
            format!("Invalid request: {}", details.into()),
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_PARAMS,
            format!("Invalid params: {}", details.into()),
        )
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            codes::INTERNAL_ERROR,
            format!("Internal error: {}", details.into()),
        )
    }

    /// Absent block, header or claim. Not a failure.
    pub fn resource_not_found(resource: impl Into<String>) -> Self {
        Self::new(
            codes::RESOURCE_NOT_FOUND,
            format!("Resource not found: {}", resource.into()),
        )
    }

    /// A collaborator is down; the caller may retry.
    pub fn resource_unavailable(details: impl Into<String>) -> Self {
        Self::with_data(
            codes::RESOURCE_UNAVAILABLE,
            format!("Resource unavailable: {}", details.into()),
            serde_json::json!({ "retryable": true }),
        )
    }

    pub fn transaction_rejected(reason: impl Into<String>) -> Self {
        Self::new(
            codes::TRANSACTION_REJECTED,
            format!("Transaction rejected: {}", reason.into()),
        )
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::new(
            codes::TIMEOUT,
            format!("Request timeout: {}", operation.into()),
        )
    }

    /// Timeout on a side-effecting call whose outcome is unknown.
    pub fn timeout_not_retry_safe(operation: impl Into<String>) -> Self {
        Self::with_data(
            codes::TIMEOUT,
            format!("Request timeout: {}", operation.into()),
            serde_json::json!({ "retry_safe": false }),
        )
    }

    pub fn already_subscribed(existing: SubscriptionId) -> Self {
        Self::with_data(
            codes::ALREADY_SUBSCRIBED,
            "Session already has an active subscription",
            serde_json::json!({ "subscription": existing.to_string() }),
        )
    }

    pub fn slow_consumer() -> Self {
        Self::new(
            codes::SLOW_CONSUMER,
            "Subscription closed: consumer too slow",
        )
    }

    pub fn subscription_closed(reason: impl Into<String>) -> Self {
        Self::new(
            codes::SUBSCRIPTION_CLOSED,
            format!("Subscription closed: {}", reason.into()),
        )
    }

    /// True for errors that should not be counted as server faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.code,
            codes::PARSE_ERROR
                | codes::INVALID_REQUEST
                | codes::METHOD_NOT_FOUND
                | codes::INVALID_PARAMS
                | codes::RESOURCE_NOT_FOUND
                | codes::ALREADY_SUBSCRIBED
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let len = if self.data.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("ApiError", len)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref data) = self.data {
            state.serialize_field("data", data)?;
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for ApiError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ErrorHelper {
            code: i32,
            message: String,
            data: Option<serde_json::Value>,
        }

        let helper = ErrorHelper::deserialize(deserializer)?;
        Ok(ApiError {
            code: helper.code,
            message: helper.message,
            data: helper.data,
        })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure to register a header subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("start height {start} is more than {max} blocks behind tip {tip}")]
    BackfillTooDeep { start: Height, tip: Height, max: u64 },

    #[error("registry is shutting down")]
    ShuttingDown,
}

/// Rejected `deliver` call. Nothing is fanned out when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliverError {
    /// Header at or below the current tip.
    #[error("stale header {got}, tip is {tip}")]
    Stale { tip: Height, got: Height },

    /// Header skips heights; the caller must deliver `expected` first.
    #[error("header gap: expected {expected}, got {got}")]
    Gap { expected: Height, got: Height },
}

/// Terminal error on a header stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("subscriber could not keep up with the header feed")]
    SlowConsumer,

    #[error("backfill read failed: {0}")]
    Backfill(StoreError),

    #[error("backfill out of order: expected {expected}, got {got}")]
    BackfillGap { expected: Height, got: Height },
}

/// Session-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session already subscribed as {0}")]
    AlreadySubscribed(SubscriptionId),

    #[error("session is closed")]
    Closed,

    #[error(transparent)]
    Register(#[from] RegisterError),
}

/// Service-level errors (startup and lifecycle, not JSON-RPC).
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    #[error("server bind error: {0}")]
    Bind(#[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("storage error during startup: {0}")]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_eof() {
            ApiError::parse_error(e.to_string())
        } else {
            ApiError::invalid_params(e.to_string())
        }
    }
}

impl From<hex::FromHexError> for ApiError {
    fn from(e: hex::FromHexError) -> Self {
        ApiError::invalid_params(format!("invalid hex: {}", e))
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NonContiguous { .. } => ApiError::internal(e.to_string()),
            other => ApiError::resource_unavailable(other.to_string()),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Unavailable(msg) => ApiError::resource_unavailable(msg),
            SearchError::InvalidQuery(msg) => ApiError::invalid_params(msg),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Unavailable(msg) => ApiError::resource_unavailable(msg),
            SubmitError::Rejected(reason) => ApiError::transaction_rejected(reason),
        }
    }
}

impl From<RegisterError> for ApiError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::BackfillTooDeep { .. } => ApiError::invalid_params(e.to_string()),
            RegisterError::ShuttingDown => ApiError::resource_unavailable(e.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::AlreadySubscribed(id) => ApiError::already_subscribed(id),
            SessionError::Closed => ApiError::subscription_closed("session closed"),
            SessionError::Register(inner) => inner.into(),
        }
    }
}

impl From<SubscriptionError> for ApiError {
    fn from(e: SubscriptionError) -> Self {
        match e {
            SubscriptionError::SlowConsumer => ApiError::slow_consumer(),
            SubscriptionError::Backfill(inner) => {
                let mut err = ApiError::subscription_closed(inner.to_string());
                err.data = Some(serde_json::json!({ "retryable": true }));
                err
            }
            other => ApiError::subscription_closed(other.to_string()),
        }
    }
}

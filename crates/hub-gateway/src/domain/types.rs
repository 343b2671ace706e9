//! JSON-RPC envelopes and wire records.

use crate::domain::error::{ApiError, ApiResult};
use crate::domain::ids::SubscriptionId;
use hub_types::{Block, BlockHash, BlockSelector, ChainHeader, Height};
use serde::Deserialize;
use serde_json::{json, Value};

/// Header as sent on the wire: hashes and raw bytes hex-encoded.
pub type HeaderRecord = ChainHeader;

/// Block as sent on the wire.
pub type BlockRecord = Block;

/// Notification method for live subscription headers.
pub const SUBSCRIPTION_NOTIFICATION: &str = "hub_subscription";
/// Notification method sent when a subscription ends abnormally.
pub const SUBSCRIPTION_CLOSED_NOTIFICATION: &str = "hub_subscriptionClosed";
/// Notification method for `hub_getHeaders` items over WebSocket.
pub const HEADERS_NOTIFICATION: &str = "hub_headers";

/// Longest accepted string id.
pub const MAX_ID_LENGTH: usize = 256;

/// A validated JSON-RPC request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub id: Value,
    pub method: String,
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Validate the envelope.
    ///
    /// On failure returns the id to echo (if one could be read) with the
    /// error.
    pub fn from_value(request: &Value) -> Result<Self, (Value, ApiError)> {
        let Some(obj) = request.as_object() else {
            return Err((Value::Null, ApiError::invalid_request("expected an object")));
        };

        let id = match obj.get("id") {
            None | Some(Value::Null) => {
                return Err((
                    Value::Null,
                    ApiError::invalid_request("missing id (notifications not supported)"),
                ))
            }
            Some(Value::String(s)) if s.is_empty() => {
                return Err((Value::Null, ApiError::invalid_request("empty string id")))
            }
            Some(Value::String(s)) if s.len() > MAX_ID_LENGTH => {
                return Err((
                    Value::Null,
                    ApiError::invalid_request(format!(
                        "id string too long (max {} chars)",
                        MAX_ID_LENGTH
                    )),
                ))
            }
            Some(id @ (Value::String(_) | Value::Number(_))) => id.clone(),
            Some(_) => {
                return Err((
                    Value::Null,
                    ApiError::invalid_request("id must be string or number"),
                ))
            }
        };

        if let Some(version) = obj.get("jsonrpc") {
            if version.as_str() != Some("2.0") {
                return Err((id, ApiError::invalid_request("jsonrpc must be \"2.0\"")));
            }
        }

        let method = match obj.get("method") {
            Some(Value::String(m)) if !m.is_empty() => m.clone(),
            _ => return Err((id, ApiError::invalid_request("missing method"))),
        };

        let params = match obj.get("params") {
            None | Some(Value::Null) => None,
            Some(p @ (Value::Array(_) | Value::Object(_))) => Some(p.clone()),
            Some(_) => {
                return Err((
                    id,
                    ApiError::invalid_request("params must be an array or object"),
                ))
            }
        };

        Ok(Self { id, method, params })
    }
}

pub fn json_rpc_result(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn json_rpc_error(id: &Value, error: &ApiError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": error
    })
}

pub fn subscription_notification(subscription: SubscriptionId, header: &HeaderRecord) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": SUBSCRIPTION_NOTIFICATION,
        "params": {
            "subscription": subscription,
            "result": header
        }
    })
}

pub fn subscription_closed_notification(subscription: SubscriptionId, error: &ApiError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": SUBSCRIPTION_CLOSED_NOTIFICATION,
        "params": {
            "subscription": subscription,
            "code": error.code,
            "reason": error.message
        }
    })
}

pub fn headers_notification(request_id: &Value, header: &HeaderRecord) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": HEADERS_NOTIFICATION,
        "params": {
            "id": request_id,
            "result": header
        }
    })
}

/// Block selector as accepted on the wire: a bare height, a bare hash, or
/// `{"height": n}` / `{"hash": "hex"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BlockParam {
    Height(Height),
    Hash(String),
    Object(BlockRequest),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockRequest {
    pub height: Option<Height>,
    pub hash: Option<String>,
}

impl BlockParam {
    /// Exactly one selector must be present; hashes must be 64 hex chars.
    pub fn into_selector(self) -> ApiResult<BlockSelector> {
        match self {
            BlockParam::Height(h) => Ok(BlockSelector::Height(h)),
            BlockParam::Hash(hash) => parse_hash(&hash),
            BlockParam::Object(BlockRequest {
                height: Some(h),
                hash: None,
            }) => Ok(BlockSelector::Height(h)),
            BlockParam::Object(BlockRequest {
                height: None,
                hash: Some(hash),
            }) => parse_hash(&hash),
            BlockParam::Object(BlockRequest {
                height: Some(_),
                hash: Some(_),
            }) => Err(ApiError::invalid_params(
                "specify either height or hash, not both",
            )),
            BlockParam::Object(BlockRequest {
                height: None,
                hash: None,
            }) => Err(ApiError::invalid_params("missing height or hash")),
        }
    }
}

fn parse_hash(hash: &str) -> ApiResult<BlockSelector> {
    BlockHash::from_hex(hash)
        .map(BlockSelector::Hash)
        .map_err(|e| ApiError::invalid_params(format!("invalid block hash: {}", e)))
}

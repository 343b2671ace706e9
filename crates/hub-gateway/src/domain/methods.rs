//! Method names and typed call parsing.
//!
//! Every request is parsed into a `HubCall` at the boundary; handlers never
//! look at raw params.

use crate::domain::error::{ApiError, ApiResult};
use crate::domain::ids::SubscriptionId;
use crate::domain::search::SearchRequest;
use crate::domain::types::BlockParam;
use hub_types::Height;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

pub mod names {
    pub const SUBSCRIBE_HEADERS: &str = "hub_subscribeHeaders";
    pub const UNSUBSCRIBE_HEADERS: &str = "hub_unsubscribeHeaders";
    pub const GET_HEADERS: &str = "hub_getHeaders";
    pub const SEARCH: &str = "hub_search";
    pub const GET_BLOCK: &str = "hub_getBlock";
    pub const GET_BLOCK_HEADER: &str = "hub_getBlockHeader";
    pub const GET_SERVER_HEIGHT: &str = "hub_getServerHeight";
    pub const PING: &str = "hub_ping";
    pub const VERSION: &str = "hub_version";
    pub const FEATURES: &str = "hub_features";
    pub const BANNER: &str = "hub_banner";
    pub const BROADCAST: &str = "hub_broadcast";
}

/// Named-field form of `hub_subscribeHeaders`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubscribeParams {
    #[serde(alias = "height")]
    start_height: Option<Height>,
}

/// Named-field form of `hub_unsubscribeHeaders`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnsubscribeParams {
    #[serde(alias = "id")]
    subscription: Option<SubscriptionId>,
}

/// Named-field form of `hub_getHeaders`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeadersParams {
    #[serde(alias = "start_height")]
    start: Height,
    #[serde(alias = "end_height")]
    end: Option<Height>,
}

/// A parsed hub call.
#[derive(Debug, Clone, PartialEq)]
pub enum HubCall {
    SubscribeHeaders { start_height: Option<Height> },
    UnsubscribeHeaders { subscription: Option<SubscriptionId> },
    GetHeaders { start: Height, end: Option<Height> },
    Search(SearchRequest),
    GetBlock(BlockParam),
    GetBlockHeader(BlockParam),
    GetServerHeight,
    Ping,
    Version,
    Features,
    Banner,
    Broadcast { raw_tx: String },
}

impl HubCall {
    pub fn parse(method: &str, params: Option<&Value>) -> ApiResult<Self> {
        Ok(match method {
            names::SUBSCRIBE_HEADERS => HubCall::SubscribeHeaders {
                start_height: match named_params::<SubscribeParams>(params) {
                    Some(named) => named?.start_height,
                    None => parse_param_optional(params, 0)?,
                },
            },
            names::UNSUBSCRIBE_HEADERS => HubCall::UnsubscribeHeaders {
                subscription: match named_params::<UnsubscribeParams>(params) {
                    Some(named) => named?.subscription,
                    None => parse_param_optional(params, 0)?,
                },
            },
            names::GET_HEADERS => match named_params::<HeadersParams>(params) {
                Some(named) => {
                    let HeadersParams { start, end } = named?;
                    HubCall::GetHeaders { start, end }
                }
                None => HubCall::GetHeaders {
                    start: parse_param(params, 0)?,
                    end: parse_param_optional(params, 1)?,
                },
            },
            names::SEARCH => HubCall::Search(parse_param_optional(params, 0)?.unwrap_or_default()),
            names::GET_BLOCK => HubCall::GetBlock(parse_param(params, 0)?),
            names::GET_BLOCK_HEADER => HubCall::GetBlockHeader(parse_param(params, 0)?),
            names::GET_SERVER_HEIGHT => HubCall::GetServerHeight,
            names::PING => HubCall::Ping,
            names::VERSION => HubCall::Version,
            names::FEATURES => HubCall::Features,
            names::BANNER => HubCall::Banner,
            names::BROADCAST => HubCall::Broadcast {
                raw_tx: parse_param(params, 0)?,
            },
            other => return Err(ApiError::method_not_found(other)),
        })
    }

    pub fn method(&self) -> &'static str {
        match self {
            HubCall::SubscribeHeaders { .. } => names::SUBSCRIBE_HEADERS,
            HubCall::UnsubscribeHeaders { .. } => names::UNSUBSCRIBE_HEADERS,
            HubCall::GetHeaders { .. } => names::GET_HEADERS,
            HubCall::Search(_) => names::SEARCH,
            HubCall::GetBlock(_) => names::GET_BLOCK,
            HubCall::GetBlockHeader(_) => names::GET_BLOCK_HEADER,
            HubCall::GetServerHeight => names::GET_SERVER_HEIGHT,
            HubCall::Ping => names::PING,
            HubCall::Version => names::VERSION,
            HubCall::Features => names::FEATURES,
            HubCall::Banner => names::BANNER,
            HubCall::Broadcast { .. } => names::BROADCAST,
        }
    }
}

/// Parse a lone params object as the method's named fields. `None` when the
/// call used positional params.
fn named_params<T: DeserializeOwned>(params: Option<&Value>) -> Option<ApiResult<T>> {
    let object = params.filter(|p| p.is_object())?;
    Some(
        serde_json::from_value(object.clone())
            .map_err(|e| ApiError::invalid_params(format!("invalid parameters: {}", e))),
    )
}

fn param_at(params: Option<&Value>, index: usize) -> Option<&Value> {
    params.and_then(|p| {
        if p.is_array() {
            p.get(index)
        } else if index == 0 {
            Some(p)
        } else {
            None
        }
    })
}

/// Required positional parameter. A lone object counts as index 0.
fn parse_param<T: DeserializeOwned>(params: Option<&Value>, index: usize) -> ApiResult<T> {
    let param = param_at(params, index)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ApiError::invalid_params(format!("missing parameter at index {}", index)))?;

    serde_json::from_value(param.clone()).map_err(|e| {
        ApiError::invalid_params(format!("invalid parameter at index {}: {}", index, e))
    })
}

/// Optional positional parameter. Missing or null is `None`; present but
/// malformed is an error.
fn parse_param_optional<T: DeserializeOwned>(
    params: Option<&Value>,
    index: usize,
) -> ApiResult<Option<T>> {
    match param_at(params, index) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone()).map(Some).map_err(|e| {
            ApiError::invalid_params(format!("invalid parameter at index {}: {}", index, e))
        }),
    }
}

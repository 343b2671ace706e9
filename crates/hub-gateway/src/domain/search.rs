//! Wire-level search request and its normalization into `SearchQuery`.
//!
//! Claim and channel selection arrive as a singular/plural pair of optional
//! fields. They are collapsed into one `Selector` per field here, and a
//! request that sets both halves of a pair is rejected.

use crate::domain::error::{ApiError, ApiResult};
use hub_types::{SearchQuery, Selector};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SEARCH_LIMIT: u32 = 20;
pub const MAX_SEARCH_LIMIT: u32 = 200;

/// A list of ids with an optional "match NOT in set" flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertibleField {
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub value: Vec<String>,
}

/// Plural id field: either a bare array or an `InvertibleField`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdList {
    Plain(Vec<String>),
    Invertible(InvertibleField),
}

impl IdList {
    fn into_parts(self) -> (Vec<String>, bool) {
        match self {
            IdList::Plain(ids) => (ids, false),
            IdList::Invertible(f) => (f.value, f.invert),
        }
    }
}

/// `hub_search` parameters as sent by clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub text: Option<String>,
    #[serde(alias = "claim_name")]
    pub name: Option<String>,
    pub claim_id: Option<String>,
    pub claim_ids: Option<IdList>,
    pub channel_id: Option<String>,
    pub channel_ids: Option<IdList>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "claim_types")]
    pub claim_type: Vec<String>,
    pub any_tags: Vec<String>,
    pub all_tags: Vec<String>,
    pub not_tags: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl SearchRequest {
    /// Validate and normalize. Censorship is attached later by the router.
    pub fn into_query(self) -> ApiResult<SearchQuery> {
        let claim_id = selector("claim_id", self.claim_id, self.claim_ids)?;
        let channel = selector("channel_id", self.channel_id, self.channel_ids)?;

        let limit = self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if limit == 0 {
            return Err(ApiError::invalid_params("limit must be positive"));
        }

        Ok(SearchQuery {
            text: non_empty(self.text),
            name: non_empty(self.name),
            claim_id,
            channel,
            author: non_empty(self.author),
            title: non_empty(self.title),
            description: non_empty(self.description),
            claim_types: clean_ids(self.claim_type),
            any_tags: clean_ids(self.any_tags),
            all_tags: clean_ids(self.all_tags),
            not_tags: clean_ids(self.not_tags),
            order_by: clean_ids(self.order_by),
            limit: limit.min(MAX_SEARCH_LIMIT),
            offset: self.offset.unwrap_or(0),
            censorship: None,
        })
    }
}

fn selector(field: &str, single: Option<String>, many: Option<IdList>) -> ApiResult<Selector> {
    match (single, many) {
        (Some(_), Some(_)) => Err(ApiError::invalid_params(format!(
            "cannot specify both {} and {}s",
            field, field
        ))),
        (Some(id), None) => Ok(match id.trim() {
            "" => Selector::Any,
            id => Selector::Single(id.to_string()),
        }),
        (None, Some(list)) => {
            let (ids, invert) = list.into_parts();
            let ids = clean_ids(ids);
            if ids.is_empty() {
                Ok(Selector::Any)
            } else {
                Ok(Selector::Many { ids, invert })
            }
        }
        (None, None) => Ok(Selector::Any),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trim, drop blanks and dedup while keeping first-seen order.
fn clean_ids(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}

//! # Search Model
//!
//! The normalized query handed to the search collaborator and the result set
//! it returns. Wire-level request parsing lives in the gateway; by the time a
//! `SearchQuery` exists, contradictory selectors have already been rejected.

use crate::entities::Height;
use serde::{Deserialize, Serialize};

/// Selection over one logical id field (claim id, channel id).
///
/// A field is either unconstrained, pinned to one value, or matched against a
/// set, optionally inverted to mean "not in this set".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    #[default]
    Any,
    Single(String),
    Many { ids: Vec<String>, invert: bool },
}

impl Selector {
    pub fn is_any(&self) -> bool {
        matches!(self, Selector::Any)
    }

    /// Whether `value` passes this selector.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selector::Any => true,
            Selector::Single(id) => id == value,
            Selector::Many { ids, invert } => ids.iter().any(|id| id == value) != *invert,
        }
    }
}

/// Channels the operator has blocked or filtered.
///
/// Attached to a query only when blocking/filtering is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Censorship {
    pub blocked_channels: Vec<String>,
    pub filtered_channels: Vec<String>,
}

impl Censorship {
    pub fn is_empty(&self) -> bool {
        self.blocked_channels.is_empty() && self.filtered_channels.is_empty()
    }

    /// True if results from `channel_id` must be excluded.
    pub fn excludes(&self, channel_id: &str) -> bool {
        self.blocked_channels.iter().any(|c| c == channel_id)
            || self.filtered_channels.iter().any(|c| c == channel_id)
    }
}

/// Normalized claim search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub name: Option<String>,
    pub claim_id: Selector,
    pub channel: Selector,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub claim_types: Vec<String>,
    pub any_tags: Vec<String>,
    pub all_tags: Vec<String>,
    pub not_tags: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: u32,
    pub offset: u32,
    pub censorship: Option<Censorship>,
}

/// One claim output in a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutput {
    pub tx_hash: String,
    pub nout: u32,
    pub height: Height,
    pub claim_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Result set returned by the search collaborator.
///
/// The hub passes it through unmodified in shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub txos: Vec<ClaimOutput>,
    #[serde(default)]
    pub extra_txos: Vec<ClaimOutput>,
    pub total: u32,
    pub offset: u32,
    #[serde(default)]
    pub blocked_total: u32,
}

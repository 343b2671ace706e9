//! Feed event types.

use hub_types::{ChainHeader, Height};
use std::sync::Arc;

/// Event emitted by the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A new chain-tip header.
    NewHeader(Arc<ChainHeader>),
}

impl FeedEvent {
    pub fn height(&self) -> Height {
        match self {
            FeedEvent::NewHeader(header) => header.height,
        }
    }

    pub fn header(&self) -> &Arc<ChainHeader> {
        match self {
            FeedEvent::NewHeader(header) => header,
        }
    }
}

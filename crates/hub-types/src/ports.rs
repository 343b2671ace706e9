//! # Outbound Ports
//!
//! Contracts for the collaborators the hub calls into. Implementations live
//! in `hub-node` (Elasticsearch, chain daemon) or in this crate
//! (`MemoryChainStore`).

use crate::entities::{Block, BlockHash, BlockSelector, ChainHeader, Height};
use crate::errors::{SearchError, StoreError, SubmitError};
use crate::search::{SearchQuery, SearchResults};
use async_trait::async_trait;

/// Read access to the ledger.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Current tip, or `None` if the store is empty.
    async fn tip(&self) -> Result<Option<ChainHeader>, StoreError>;

    async fn header(&self, selector: BlockSelector) -> Result<Option<ChainHeader>, StoreError>;

    /// Up to `count` consecutive headers starting at `start`.
    ///
    /// Stops early at the tip; an empty vector means `start` is above it.
    async fn headers(&self, start: Height, count: usize) -> Result<Vec<ChainHeader>, StoreError>;

    async fn block(&self, selector: BlockSelector) -> Result<Option<Block>, StoreError>;
}

/// Write access used by the external notifier path.
#[async_trait]
pub trait HeaderIngest: Send + Sync {
    /// Append `header` to the chain.
    ///
    /// Returns `Ok(false)` when the header is already stored.
    async fn ingest(&self, header: ChainHeader) -> Result<bool, StoreError>;
}

/// Claim search backend.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults, SearchError>;
}

/// Network transaction submission.
///
/// Not idempotent: a submission may succeed even if the caller never hears
/// back.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Submit a raw transaction, returning its txid.
    async fn submit(&self, raw_tx: &[u8]) -> Result<BlockHash, SubmitError>;
}

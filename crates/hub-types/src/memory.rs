//! In-memory chain store.
//!
//! Backs the development node and the test suites. Headers must arrive in
//! order and link to the current tip.

use crate::entities::{Block, BlockHash, BlockSelector, ChainHeader, Height, RAW_HEADER_SIZE};
use crate::errors::StoreError;
use crate::ports::{ChainStore, HeaderIngest};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Default)]
struct ChainData {
    /// Contiguous headers; index 0 holds height `base`.
    headers: Vec<ChainHeader>,
    base: Height,
    by_hash: HashMap<BlockHash, Height>,
    transactions: HashMap<Height, Vec<Vec<u8>>>,
}

impl ChainData {
    fn tip(&self) -> Option<&ChainHeader> {
        self.headers.last()
    }

    fn at(&self, height: Height) -> Option<&ChainHeader> {
        let idx = height.checked_sub(self.base)?;
        self.headers.get(usize::try_from(idx).ok()?)
    }

    fn resolve(&self, selector: BlockSelector) -> Option<&ChainHeader> {
        match selector {
            BlockSelector::Height(h) => self.at(h),
            BlockSelector::Hash(hash) => self.by_hash.get(&hash).and_then(|h| self.at(*h)),
        }
    }
}

/// Ordered chain held in memory.
#[derive(Default)]
pub struct MemoryChainStore {
    chain: RwLock<ChainData>,
    offline: AtomicBool,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `headers`, which must be contiguous.
    pub fn with_headers(headers: Vec<ChainHeader>) -> Result<Self, StoreError> {
        let store = Self::new();
        for header in headers {
            store.append(header)?;
        }
        Ok(store)
    }

    /// Append a header that extends the tip.
    ///
    /// The first header fixes the base height of the store.
    pub fn append(&self, header: ChainHeader) -> Result<(), StoreError> {
        self.append_block(Block {
            header,
            transactions: Vec::new(),
        })
    }

    pub fn append_block(&self, block: Block) -> Result<(), StoreError> {
        let mut chain = self.chain.write();
        let header = block.header;
        if let Some(tip) = chain.tip() {
            if !header.extends(tip) {
                return Err(StoreError::NonContiguous {
                    expected: tip.height + 1,
                    got: header.height,
                });
            }
        } else {
            chain.base = header.height;
        }
        debug!(height = header.height, hash = %header.hash, "appended header");
        chain.by_hash.insert(header.hash, header.height);
        if !block.transactions.is_empty() {
            chain.transactions.insert(header.height, block.transactions);
        }
        chain.headers.push(header);
        Ok(())
    }

    /// Simulate the store going away (maintenance, refresh).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChainStore for MemoryChainStore {
    async fn tip(&self) -> Result<Option<ChainHeader>, StoreError> {
        self.check_online()?;
        Ok(self.chain.read().tip().cloned())
    }

    async fn header(&self, selector: BlockSelector) -> Result<Option<ChainHeader>, StoreError> {
        self.check_online()?;
        Ok(self.chain.read().resolve(selector).cloned())
    }

    async fn headers(&self, start: Height, count: usize) -> Result<Vec<ChainHeader>, StoreError> {
        self.check_online()?;
        let chain = self.chain.read();
        let first = start.max(chain.base);
        Ok((first..)
            .take(count)
            .map_while(|h| chain.at(h).cloned())
            .collect())
    }

    async fn block(&self, selector: BlockSelector) -> Result<Option<Block>, StoreError> {
        self.check_online()?;
        let chain = self.chain.read();
        Ok(chain.resolve(selector).map(|header| Block {
            header: header.clone(),
            transactions: chain
                .transactions
                .get(&header.height)
                .cloned()
                .unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl HeaderIngest for MemoryChainStore {
    async fn ingest(&self, header: ChainHeader) -> Result<bool, StoreError> {
        self.check_online()?;
        {
            let chain = self.chain.read();
            if let Some(existing) = chain.at(header.height) {
                if existing.hash == header.hash {
                    return Ok(false);
                }
            }
        }
        self.append(header)?;
        Ok(true)
    }
}

/// Build `len` linked headers starting at height `start`.
///
/// Raw bytes are a fixed-size header with the height in the merkle-root slot,
/// so every header hashes differently.
pub fn build_chain(start: Height, len: usize) -> Vec<ChainHeader> {
    let mut prev = BlockHash::default();
    (start..)
        .take(len)
        .map(|height| {
            let timestamp = 1_600_000_000 + height * 150;
            let mut raw = vec![0u8; RAW_HEADER_SIZE];
            raw[4..36].copy_from_slice(prev.as_bytes());
            raw[36..44].copy_from_slice(&height.to_le_bytes());
            raw[100..104].copy_from_slice(&(timestamp as u32).to_le_bytes());
            let header = ChainHeader::new(height, prev, timestamp, raw);
            prev = header.hash;
            header
        })
        .collect()
}

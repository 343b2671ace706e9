//! # Core Domain Entities
//!
//! Chain data as the hub sees it: headers ordered by height, blocks, and the
//! selectors clients use to address them.
//!
//! Hashes and raw payloads serialize as lowercase hex so the same types can
//! travel over the notifier socket and the JSON-RPC wire unchanged.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Block height in the chain.
pub type Height = u64;

/// Size of a serialized block header on chain.
pub const RAW_HEADER_SIZE: usize = 112;

/// A 32-byte block or transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// Double SHA-256 of `data`.
    pub fn digest(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        Self(second.into())
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 64 {
            return Err(HashParseError::Length(s.len()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).map_err(|e| HashParseError::Hex(e.to_string()))?;
        Ok(Self(out))
    }

    /// Lowercase hex without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for BlockHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Hash parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashParseError {
    #[error("hash must be 64 hex characters, got {0}")]
    Length(usize),
    #[error("invalid hex: {0}")]
    Hex(String),
}

/// A block header, ordered by height.
///
/// `raw` is the opaque serialized header; the hub never interprets it beyond
/// hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHeader {
    pub height: Height,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    pub timestamp: u64,
    #[serde(with = "hex_bytes")]
    pub raw: Vec<u8>,
}

impl ChainHeader {
    /// Build a header whose hash is derived from `raw`.
    pub fn new(height: Height, prev_hash: BlockHash, timestamp: u64, raw: Vec<u8>) -> Self {
        Self {
            height,
            hash: BlockHash::digest(&raw),
            prev_hash,
            timestamp,
            raw,
        }
    }

    /// True if `self` directly extends `parent`.
    pub fn extends(&self, parent: &ChainHeader) -> bool {
        self.height == parent.height + 1 && self.prev_hash == parent.hash
    }
}

/// A full block: header plus raw transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: ChainHeader,
    #[serde(with = "hex_list")]
    pub transactions: Vec<Vec<u8>>,
}

/// Addresses exactly one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockSelector {
    Height(Height),
    Hash(BlockHash),
}

impl fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSelector::Height(h) => write!(f, "height {}", h),
            BlockSelector::Hash(hash) => write!(f, "hash {}", hash),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

mod hex_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        items
            .iter()
            .map(hex::encode)
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| hex::decode(s.strip_prefix("0x").unwrap_or(s)))
            .collect::<Result<_, _>>()
            .map_err(serde::de::Error::custom)
    }
}

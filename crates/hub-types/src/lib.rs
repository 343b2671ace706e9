//! # Hub Types Crate
//!
//! Domain entities, the search model and the outbound ports shared by every
//! crate in the hub workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: headers, blocks and search queries are defined
//!   once here and flow unchanged from the upstream feed to the wire.
//! - **Ports, not engines**: storage, search and transaction submission are
//!   external collaborators; this crate only fixes their contracts
//!   (`ChainStore`, `HeaderIngest`, `SearchIndex`, `TxSubmitter`).
//! - **Not-found is data**: lookups return `Ok(None)` for absent records so
//!   callers never confuse a missing block with an unavailable backend.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entities;
pub mod errors;
pub mod memory;
pub mod ports;
pub mod search;

pub use entities::*;
pub use errors::*;
pub use memory::{build_chain, MemoryChainStore};
pub use ports::{ChainStore, HeaderIngest, SearchIndex, TxSubmitter};
pub use search::*;

//! Persistence layer
//!
//! Thin sled-backed shims around the core: a block repository keyed by
//! block id and the chainstate tree holding the UTXO index.

pub mod block_store;
pub mod utxo_set;

pub use block_store::BlockStore;
pub use utxo_set::UtxoSet;

use crate::core::block::BlockId;
use thiserror::Error;

/// Opaque persistence failures, propagated and never swallowed
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("block {0} is referenced but not stored")]
    MissingBlock(BlockId),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("chainstate lock poisoned")]
    LockPoisoned,
}

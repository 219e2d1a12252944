//! Block model
//!
//! A block carries an ordered list of transactions and is anchored to its
//! parent by id. Blocks are created exactly once, by mining, and never
//! mutated afterward.

use crate::core::transaction::Transaction;
use crate::mining::pow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte block identity. The all-zero value marks "no parent" and is
/// carried only by the genesis block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BlockId(pub [u8; 32]);

impl BlockId {
    pub const NULL: BlockId = BlockId([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A mined block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    id: BlockId,
    previous_id: BlockId,
    transactions: Vec<Transaction>,
    timestamp: DateTime<Utc>,
    nonce: u64,
}

impl Block {
    /// Mine a new block on top of `previous_id`
    pub fn new(previous_id: BlockId, transactions: Vec<Transaction>) -> Self {
        let result = pow::mine(&previous_id, &transactions);
        Self {
            id: BlockId(result.hash),
            previous_id,
            transactions,
            timestamp: result.timestamp,
            nonce: result.nonce,
        }
    }

    /// Mine the genesis block around a single coinbase transaction
    pub fn genesis(coinbase: Transaction) -> Self {
        Self::new(BlockId::NULL, vec![coinbase])
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn previous_id(&self) -> BlockId {
        self.previous_id
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::wallet::Address;

    fn coinbase() -> Transaction {
        let kp = KeyPair::generate();
        Transaction::coinbase(&Address::from_pub_key_hash(kp.pub_key_hash()), None)
    }

    #[test]
    fn genesis_has_null_parent() {
        let block = Block::genesis(coinbase());
        assert!(block.previous_id().is_null());
        assert!(!block.id().is_null());
        assert_eq!(block.transactions().len(), 1);
    }

    #[test]
    fn mined_block_links_to_parent() {
        let genesis = Block::genesis(coinbase());
        let next = Block::new(genesis.id(), vec![coinbase()]);
        assert_eq!(next.previous_id(), genesis.id());
        assert_ne!(next.id(), genesis.id());
    }

    #[test]
    fn block_round_trips_through_json() {
        let block = Block::genesis(coinbase());
        let json = serde_json::to_vec(&block).unwrap();
        let restored: Block = serde_json::from_slice(&json).unwrap();
        assert_eq!(block, restored);
    }
}

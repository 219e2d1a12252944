//! Proof-of-work engine
//!
//! Byte-exact block header hashing, the brute-force nonce search and the
//! pure re-derivation used to validate stored blocks. The difficulty is a
//! chain-lifetime constant; there is no retargeting.

use crate::core::block::{Block, BlockId};
use crate::core::transaction::Transaction;
use crate::crypto::{meets_difficulty, merkle_root, sha256_concat};
use chrono::{DateTime, Utc};
use log::{debug, info};

/// Number of leading zero bits a block hash must carry. The target is
/// `1 << (256 - TARGET_BITS)`; a hash is valid when it is strictly below
/// that value.
pub const TARGET_BITS: u32 = 16;

/// Outcome of a successful nonce search
#[derive(Debug, Clone)]
pub struct PowResult {
    pub hash: [u8; 32],
    pub nonce: u64,
    pub timestamp: DateTime<Utc>,
}

/// Merkle root over the transactions' content hashes
pub fn transactions_root(transactions: &[Transaction]) -> [u8; 32] {
    merkle_root(transactions.iter().map(Transaction::content_hash).collect())
}

/// Block header hash: SHA-256 over the raw previous-id bytes, the
/// transaction Merkle root, the timestamp in big-endian milliseconds, the
/// difficulty bits and the nonce, each fixed-width.
pub fn header_hash(
    previous_id: &BlockId,
    transactions_root: &[u8; 32],
    timestamp_millis: i64,
    nonce: u64,
) -> [u8; 32] {
    sha256_concat(&[
        previous_id.as_bytes(),
        transactions_root,
        &timestamp_millis.to_be_bytes(),
        &TARGET_BITS.to_be_bytes(),
        &nonce.to_be_bytes(),
    ])
}

/// Search for a nonce whose header hash meets the difficulty target.
///
/// The timestamp is fixed once at call time, so the search is a pure
/// function of `(previous_id, transactions, timestamp, nonce)`. Expected
/// work is ~2^16 hashes at the fixed difficulty; the call blocks until a
/// nonce is found. Exhausting the 64-bit nonce space is unreachable at
/// this difficulty and treated as fatal.
pub fn mine(previous_id: &BlockId, transactions: &[Transaction]) -> PowResult {
    let timestamp = Utc::now();
    let timestamp_millis = timestamp.timestamp_millis();
    let root = transactions_root(transactions);

    info!(
        "mining over parent {} with {} transaction(s)",
        previous_id,
        transactions.len()
    );
    let started = std::time::Instant::now();

    let mut nonce = 0u64;
    loop {
        let hash = header_hash(previous_id, &root, timestamp_millis, nonce);
        if meets_difficulty(&hash, TARGET_BITS) {
            debug!(
                "found nonce {} after {:?}, hash {}",
                nonce,
                started.elapsed(),
                hex::encode(hash)
            );
            return PowResult {
                hash,
                nonce,
                timestamp,
            };
        }
        nonce = match nonce.checked_add(1) {
            Some(next) => next,
            None => unreachable!("64-bit nonce space exhausted at {TARGET_BITS} target bits"),
        };
    }
}

/// Re-derive a stored block's header hash and check it against the
/// difficulty target. Pure and side-effect free; never re-mines.
pub fn validate(block: &Block) -> bool {
    let root = transactions_root(block.transactions());
    let hash = header_hash(
        &block.previous_id(),
        &root,
        block.timestamp().timestamp_millis(),
        block.nonce(),
    );
    meets_difficulty(&hash, TARGET_BITS)
}

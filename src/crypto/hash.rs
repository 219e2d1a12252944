//! Hashing primitives for the ledger
//!
//! Provides the SHA-256 / RIPEMD-160 digest helpers used for block
//! identities, transaction identities and address hashes, together with
//! the proof-of-work target check.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Computes SHA-256 of the input data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes SHA-256 over the concatenation of several byte slices.
///
/// The parts are fed to the digest in order without separators or length
/// prefixes, so callers must use fixed-width encodings for anything
/// ambiguous.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Computes double SHA-256 (SHA-256 of SHA-256).
/// Used for the 4-byte address checksum.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Computes RIPEMD-160 of SHA-256, the public-key-hash digest
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(data));
    ripemd.finalize().into()
}

/// Checks whether a hash, read as an unsigned big-endian integer, is
/// strictly below `1 << (256 - bits)`.
///
/// Equivalent to requiring the first `bits` bits of the digest to be zero,
/// so no big-integer arithmetic is needed.
pub fn meets_difficulty(hash: &[u8; 32], bits: u32) -> bool {
    let full_bytes = bits as usize / 8;
    let remaining_bits = bits as usize % 8;

    for byte in hash.iter().take(full_bytes) {
        if *byte != 0 {
            return false;
        }
    }

    if remaining_bits > 0 && full_bytes < hash.len() {
        let mask = 0xFFu8 << (8 - remaining_bits);
        if hash[full_bytes] & mask != 0 {
            return false;
        }
    }

    true
}

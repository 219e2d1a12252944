//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 / RIPEMD-160 hashing
//! - ECDSA key management (secp256k1)
//! - Merkle root calculation

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{double_sha256, hash160, meets_difficulty, sha256, sha256_concat};
pub use keys::{sign_digest, verify_digest, KeyError, KeyPair, PubKeyHash};
pub use merkle::merkle_root;

//! Proof-of-work mining

pub mod pow;

pub use pow::{header_hash, mine, validate, PowResult, TARGET_BITS};

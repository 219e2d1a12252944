//! Base58Check address encoding
//!
//! An address is the human-displayable form of a public-key hash: a
//! version byte, the 20 hash bytes and a 4-byte double-SHA-256 checksum,
//! Base58 encoded. The core only ever operates on the raw hash; this is
//! the text boundary.

use crate::crypto::{double_sha256, PubKeyHash};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version byte prefixed to every address payload
pub const ADDRESS_VERSION: u8 = 0x00;

const CHECKSUM_LEN: usize = 4;
const PAYLOAD_LEN: usize = 1 + 20 + CHECKSUM_LEN;

/// Address parsing errors
#[derive(Error, Debug)]
pub enum AddressError {
    #[error("invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),
    #[error("address payload of {0} bytes, expected {PAYLOAD_LEN}")]
    BadLength(usize),
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("unknown address version {0:#04x}")]
    UnknownVersion(u8),
}

/// A checksummed public-key-hash address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    version: u8,
    pub_key_hash: PubKeyHash,
}

impl Address {
    pub fn from_pub_key_hash(pub_key_hash: PubKeyHash) -> Self {
        Self {
            version: ADDRESS_VERSION,
            pub_key_hash,
        }
    }

    pub fn pub_key_hash(&self) -> PubKeyHash {
        self.pub_key_hash
    }

    pub fn version(&self) -> u8 {
        self.version
    }
}

fn checksum(versioned_payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = double_sha256(versioned_payload);
    let mut check = [0u8; CHECKSUM_LEN];
    check.copy_from_slice(&digest[..CHECKSUM_LEN]);
    check
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        payload.push(self.version);
        payload.extend_from_slice(self.pub_key_hash.as_bytes());
        let check = checksum(&payload);
        payload.extend_from_slice(&check);
        write!(f, "{}", bs58::encode(payload).into_string())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = bs58::decode(s).into_vec()?;
        if payload.len() != PAYLOAD_LEN {
            return Err(AddressError::BadLength(payload.len()));
        }

        let (versioned, check) = payload.split_at(PAYLOAD_LEN - CHECKSUM_LEN);
        if checksum(versioned) != check {
            return Err(AddressError::BadChecksum);
        }

        let version = versioned[0];
        if version != ADDRESS_VERSION {
            return Err(AddressError::UnknownVersion(version));
        }

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&versioned[1..]);
        Ok(Self {
            version,
            pub_key_hash: PubKeyHash(hash),
        })
    }
}

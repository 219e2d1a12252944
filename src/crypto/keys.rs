//! ECDSA key management
//!
//! Key pair generation, signing and verification over the secp256k1 curve,
//! plus the public-key-hash digest that outputs are locked to.

use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::hash::hash160;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature encoding")]
    InvalidSignature,
    #[error("Secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),
}

/// RIPEMD-160(SHA-256) hash of a public key, used as the lock identifier
/// on transaction outputs and as the payload of an address.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct PubKeyHash(pub [u8; 20]);

impl PubKeyHash {
    /// Hash the serialized (compressed) form of a public key
    pub fn of_key(public_key: &PublicKey) -> Self {
        Self(hash160(&public_key.serialize()))
    }

    /// Hash raw public key bytes as stored on a transaction input
    pub fn of_raw(public_key_bytes: &[u8]) -> Self {
        Self(hash160(public_key_bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for PubKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A secp256k1 key pair
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key = SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key in compressed wire form (33 bytes)
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    /// Hash of the public key, the value outputs are locked to
    pub fn pub_key_hash(&self) -> PubKeyHash {
        PubKeyHash::of_key(&self.public_key)
    }

    /// Sign a 32-byte digest with the private key
    pub fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, KeyError> {
        sign_digest(&self.secret_key, digest)
    }
}

/// Sign a 32-byte digest, returning the compact 64-byte signature
pub fn sign_digest(secret_key: &SecretKey, digest: &[u8; 32]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verify a compact signature over a 32-byte digest against raw public
/// key bytes as stored on a transaction input
pub fn verify_digest(
    public_key_bytes: &[u8],
    digest: &[u8; 32],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let public_key =
        PublicKey::from_slice(public_key_bytes).map_err(|_| KeyError::InvalidPublicKey)?;
    let message = Message::from_digest_slice(digest)?;
    let signature =
        Signature::from_compact(signature).map_err(|_| KeyError::InvalidSignature)?;

    Ok(secp.verify_ecdsa(&message, &signature, &public_key).is_ok())
}

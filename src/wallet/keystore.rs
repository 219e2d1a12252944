//! Wallets and the on-disk key store
//!
//! A wallet wraps one secp256k1 key pair and knows how to assemble and
//! sign payments. The keystore is a JSON file mapping address text to hex
//! private keys; key generation and storage live entirely on this side of
//! the core boundary.

use crate::core::blockchain::{Blockchain, BlockchainError};
use crate::core::transaction::{Transaction, TxInput, TxOutput};
use crate::crypto::{KeyError, KeyPair, PubKeyHash};
use crate::storage::{StoreError, UtxoSet};
use crate::wallet::address::{Address, AddressError};
use log::info;
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Wallet-level errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("no wallet stored for address {0}")]
    UnknownAddress(String),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("keystore file error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A key pair with payment-building behavior
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    /// Create a wallet with a fresh key pair
    pub fn new() -> Self {
        Self {
            key_pair: KeyPair::generate(),
        }
    }

    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, WalletError> {
        Ok(Self {
            key_pair: KeyPair::from_private_key_hex(hex_key)?,
        })
    }

    pub fn address(&self) -> Address {
        Address::from_pub_key_hash(self.key_pair.pub_key_hash())
    }

    pub fn pub_key_hash(&self) -> PubKeyHash {
        self.key_pair.pub_key_hash()
    }

    /// Public key in the wire form stored on transaction inputs
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.key_pair.public_key_bytes()
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.key_pair.secret_key
    }

    fn private_key_hex(&self) -> String {
        self.key_pair.private_key_hex()
    }

    /// Balance by the slow full-scan path
    pub fn balance(&self, chain: &Blockchain) -> Result<u64, StoreError> {
        let mut total = 0u64;
        for unspent in chain.unspent_outputs(&self.public_key_bytes()) {
            total += unspent?.output.value;
        }
        Ok(total)
    }

    /// Build and sign a payment of `amount` to `to`, selecting inputs
    /// greedily from the UTXO index and returning change to this wallet
    pub fn create_payment(
        &self,
        to: &Address,
        amount: u64,
        chain: &Blockchain,
        utxos: &UtxoSet,
    ) -> Result<Transaction, WalletError> {
        let (have, spendable) = utxos.find_spendable_outputs(&self.pub_key_hash(), amount)?;
        if have < amount {
            return Err(WalletError::InsufficientFunds { have, need: amount });
        }

        let inputs = spendable
            .into_iter()
            .map(|(tx_id, index)| {
                TxInput::new(tx_id, index as i32, Some(self.public_key_bytes()))
            })
            .collect();

        let mut outputs = vec![TxOutput::new(amount, to.pub_key_hash())];
        if have > amount {
            outputs.push(TxOutput::new(have - amount, self.pub_key_hash()));
        }

        let mut tx = Transaction::new(inputs, outputs);
        chain.sign_transaction(&mut tx, self.secret_key())?;
        Ok(tx)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk representation of one wallet
#[derive(Serialize, Deserialize)]
struct StoredWallet {
    private_key: String,
}

/// File-backed collection of wallets keyed by address text
pub struct Keystore {
    path: PathBuf,
    wallets: HashMap<String, Wallet>,
}

impl Keystore {
    /// Load the keystore at `path`, starting empty when the file does
    /// not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref().to_path_buf();
        let mut wallets = HashMap::new();

        if path.exists() {
            let raw = fs::read(&path)?;
            let stored: HashMap<String, StoredWallet> = serde_json::from_slice(&raw)?;
            for (address, entry) in stored {
                wallets.insert(address, Wallet::from_private_key_hex(&entry.private_key)?);
            }
        }

        Ok(Self { path, wallets })
    }

    /// Generate a key pair, persist it and return its address
    pub fn create_wallet(&mut self) -> Result<Address, WalletError> {
        let wallet = Wallet::new();
        let address = wallet.address();
        self.wallets.insert(address.to_string(), wallet);
        self.save()?;
        info!("stored new wallet for address {address}");
        Ok(address)
    }

    /// Look up the wallet holding the keys for `address`
    pub fn get_wallet(&self, address: &Address) -> Result<&Wallet, WalletError> {
        self.wallets
            .get(&address.to_string())
            .ok_or_else(|| WalletError::UnknownAddress(address.to_string()))
    }

    /// All stored addresses, sorted for stable listing
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    fn save(&self) -> Result<(), WalletError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored: HashMap<&String, StoredWallet> = self
            .wallets
            .iter()
            .map(|(address, wallet)| {
                (
                    address,
                    StoredWallet {
                        private_key: wallet.private_key_hex(),
                    },
                )
            })
            .collect();
        fs::write(&self.path, serde_json::to_vec_pretty(&stored)?)?;
        Ok(())
    }
}

//! utxo-ledger: a single-node, UTXO-based ledger
//!
//! A hash-linked chain of proof-of-work blocks carrying transactions that
//! move value between public-key-hash addresses. This crate provides:
//! - SHA-256 block and transaction identities with Merkle digests
//! - ECDSA-signed inputs (secp256k1) with per-input verification
//! - A fixed-difficulty proof-of-work miner and validator
//! - A sled-backed block store and incrementally maintained UTXO index
//! - Base58Check addresses and a file-backed wallet keystore
//!
//! # Example
//!
//! ```rust
//! use utxo_ledger::core::Blockchain;
//! use utxo_ledger::storage::{BlockStore, UtxoSet};
//! use utxo_ledger::wallet::Wallet;
//!
//! let db = sled::Config::new().temporary(true).open().unwrap();
//! let wallet = Wallet::new();
//!
//! // Mine a genesis block paying the subsidy to the wallet
//! let chain = Blockchain::create(BlockStore::open(&db).unwrap(), &wallet.address()).unwrap();
//!
//! // Build the UTXO index and check the balance
//! let utxos = UtxoSet::open(&db).unwrap();
//! utxos.reindex(&chain).unwrap();
//! assert_eq!(wallet.balance(&chain).unwrap(), 10);
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use crate::core::{
    Block, BlockId, Blockchain, BlockchainError, Transaction, TransactionError, TxId, TxInput,
    TxOutput, SUBSIDY,
};
pub use crypto::{KeyPair, PubKeyHash};
pub use mining::TARGET_BITS;
pub use storage::{BlockStore, StoreError, UtxoSet};
pub use wallet::{Address, Keystore, Wallet, WalletError};

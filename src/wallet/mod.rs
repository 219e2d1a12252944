//! Wallets: key storage and address encoding

pub mod address;
pub mod keystore;

pub use address::{Address, AddressError, ADDRESS_VERSION};
pub use keystore::{Keystore, Wallet, WalletError};

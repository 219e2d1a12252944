//! CLI command handlers
//!
//! Each handler wires the persistence collaborators (sled database,
//! keystore file) to the ledger façade for one operation and prints the
//! outcome. State lives entirely under the chosen data directory.

use crate::core::{Blockchain, Transaction};
use crate::mining;
use crate::storage::{BlockStore, UtxoSet};
use crate::wallet::{Address, Keystore};
use std::path::Path;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn open_db(data_dir: &Path) -> CliResult<sled::Db> {
    Ok(sled::open(data_dir.join("chain"))?)
}

fn keystore_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join("wallets.json")
}

/// Generate a new key pair and save it into the wallet file
pub fn create_wallet(data_dir: &Path) -> CliResult<()> {
    let mut keystore = Keystore::open(keystore_path(data_dir))?;
    let address = keystore.create_wallet()?;
    println!("wallet address: {address}");
    Ok(())
}

/// Print all stored wallet addresses
pub fn list_addresses(data_dir: &Path) -> CliResult<()> {
    let keystore = Keystore::open(keystore_path(data_dir))?;
    let addresses = keystore.addresses();
    if addresses.is_empty() {
        println!("no wallets yet, run 'createwallet' first");
        return Ok(());
    }
    for address in addresses {
        println!("{address}");
    }
    Ok(())
}

/// Create the chain, paying the genesis subsidy to `address`, and build
/// the UTXO index
pub fn create_blockchain(data_dir: &Path, address: &str) -> CliResult<()> {
    let address: Address = address.parse()?;
    let db = open_db(data_dir)?;

    let chain = Blockchain::create(BlockStore::open(&db)?, &address)?;
    let utxos = UtxoSet::open(&db)?;
    utxos.reindex(&chain)?;

    println!("done, chain tip: {}", chain.tip());
    Ok(())
}

/// Report the balance of any address from the UTXO index. Only the
/// hash encoded in the address text is needed, so this works for
/// addresses with no wallet in the local keystore.
pub fn get_balance(data_dir: &Path, address: &str) -> CliResult<()> {
    let parsed: Address = address.parse()?;
    let db = open_db(data_dir)?;
    let utxos = UtxoSet::open(&db)?;

    let balance: u64 = utxos
        .find_utxos(&parsed.pub_key_hash())?
        .iter()
        .map(|output| output.value)
        .sum();
    println!("balance of '{parsed}': {balance}");
    Ok(())
}

/// Send `amount` units from one stored wallet to an address, mining a
/// block with the payment plus a coinbase reward to the sender
pub fn send(data_dir: &Path, from: &str, to: &str, amount: u64) -> CliResult<()> {
    if amount == 0 {
        return Err("amount must be at least 1".into());
    }
    let from: Address = from.parse()?;
    let to: Address = to.parse()?;

    let keystore = Keystore::open(keystore_path(data_dir))?;
    let wallet = keystore.get_wallet(&from)?;

    let db = open_db(data_dir)?;
    let mut chain = Blockchain::open(BlockStore::open(&db)?)?;
    let utxos = UtxoSet::open(&db)?;

    let payment = wallet.create_payment(&to, amount, &chain, &utxos)?;
    let reward = Transaction::coinbase(&from, None);

    let block = chain.mine_block(vec![payment, reward])?;
    utxos.update(&block)?;

    println!("success, block {}", block.id());
    Ok(())
}

/// Print every block from the tip back to genesis
pub fn print_chain(data_dir: &Path) -> CliResult<()> {
    let db = open_db(data_dir)?;
    let chain = Blockchain::open(BlockStore::open(&db)?)?;

    for block in chain.iter() {
        let block = block?;
        println!("block     {}", block.id());
        println!("previous  {}", block.previous_id());
        println!("mined at  {}", block.timestamp());
        println!("nonce     {}", block.nonce());
        println!("valid     {}", mining::validate(&block));
        for tx in block.transactions() {
            println!("  tx {}", tx.id());
        }
        println!();
    }
    Ok(())
}

/// Rebuild the UTXO index from a full chain scan
pub fn reindex_utxo(data_dir: &Path) -> CliResult<()> {
    let db = open_db(data_dir)?;
    let chain = Blockchain::open(BlockStore::open(&db)?)?;
    let utxos = UtxoSet::open(&db)?;

    utxos.reindex(&chain)?;
    println!(
        "done, {} transaction(s) carry unspent outputs",
        utxos.entries()?.len()
    );
    Ok(())
}

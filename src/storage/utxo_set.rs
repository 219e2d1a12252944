//! UTXO index
//!
//! Maps a transaction id to its not-yet-spent outputs so that balance
//! queries and spend selection never replay the whole chain. Entries live
//! in the `chainstate` sled tree as JSON lists of `(output index, output)`
//! pairs, keyed by the raw transaction id.
//!
//! The index is built once by [`reindex`](UtxoSet::reindex) and maintained
//! incrementally by [`update`](UtxoSet::update), which must run exactly
//! once per appended block, in block order. If index and chain diverge,
//! `reindex` is the recovery path. A single writer lock makes mutations
//! mutually exclusive with each other and with spend-selection reads.

use crate::core::block::Block;
use crate::core::blockchain::Blockchain;
use crate::core::transaction::{TxId, TxOutput};
use crate::crypto::PubKeyHash;
use crate::storage::StoreError;
use log::info;
use std::collections::HashMap;
use std::sync::RwLock;

const TREE_NAME: &str = "chainstate";

type Entry = Vec<(u32, TxOutput)>;

/// The unspent-output index over the chainstate tree
pub struct UtxoSet {
    tree: sled::Tree,
    lock: RwLock<()>,
}

impl UtxoSet {
    /// Open the chainstate tree inside an already-opened database
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            tree: db.open_tree(TREE_NAME)?,
            lock: RwLock::new(()),
        })
    }

    /// Greedily accumulate outputs locked to `pub_key_hash` until the
    /// total reaches `amount` or the index is exhausted.
    ///
    /// Entries are scanned in the tree's stable key order. The selected
    /// set covers the amount when possible but is not minimal. Returns
    /// the accumulated total and the `(transaction id, output index)`
    /// references to spend.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &PubKeyHash,
        amount: u64,
    ) -> Result<(u64, Vec<(TxId, u32)>), StoreError> {
        let _guard = self.lock.read().map_err(|_| StoreError::LockPoisoned)?;

        let mut accumulated = 0u64;
        let mut selected = Vec::new();

        'scan: for item in self.tree.iter() {
            let (key, value) = item?;
            let tx_id = decode_tx_id(&key)?;
            let entry: Entry = serde_json::from_slice(&value)?;

            for (index, output) in entry {
                if output.is_locked_with(pub_key_hash) {
                    accumulated += output.value;
                    selected.push((tx_id, index));
                    if accumulated >= amount {
                        break 'scan;
                    }
                }
            }
        }

        Ok((accumulated, selected))
    }

    /// All unspent outputs locked to `pub_key_hash`
    pub fn find_utxos(&self, pub_key_hash: &PubKeyHash) -> Result<Vec<TxOutput>, StoreError> {
        let _guard = self.lock.read().map_err(|_| StoreError::LockPoisoned)?;

        let mut utxos = Vec::new();
        for item in self.tree.iter() {
            let (_, value) = item?;
            let entry: Entry = serde_json::from_slice(&value)?;
            for (_, output) in entry {
                if output.is_locked_with(pub_key_hash) {
                    utxos.push(output);
                }
            }
        }
        Ok(utxos)
    }

    /// Snapshot of the whole index, keyed by transaction id
    pub fn entries(&self) -> Result<HashMap<TxId, Entry>, StoreError> {
        let _guard = self.lock.read().map_err(|_| StoreError::LockPoisoned)?;

        let mut entries = HashMap::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            let mut entry: Entry = serde_json::from_slice(&value)?;
            entry.sort_by_key(|(index, _)| *index);
            entries.insert(decode_tx_id(&key)?, entry);
        }
        Ok(entries)
    }

    /// Rebuild the index from a full chain scan.
    ///
    /// Clears everything first, so this is idempotent and safe to call at
    /// any time; it is the recovery path when index and chain diverge.
    pub fn reindex(&self, chain: &Blockchain) -> Result<(), StoreError> {
        let _guard = self.lock.write().map_err(|_| StoreError::LockPoisoned)?;

        info!("rebuilding UTXO index from chain scan");
        self.tree.clear()?;
        let all = chain.find_all_utxos()?;
        let count = all.len();
        for (tx_id, entry) in all {
            self.tree
                .insert(tx_id.as_bytes(), serde_json::to_vec(&entry)?)?;
        }
        info!("UTXO index rebuilt, {count} transaction(s) carry unspent outputs");
        Ok(())
    }

    /// Fold one newly appended block into the index: drop every output
    /// consumed by a non-coinbase input, then record every output the
    /// block's transactions produce.
    ///
    /// Must be applied exactly once per appended block, in block order;
    /// unlike `reindex` it is not idempotent.
    pub fn update(&self, block: &Block) -> Result<(), StoreError> {
        let _guard = self.lock.write().map_err(|_| StoreError::LockPoisoned)?;

        for tx in block.transactions() {
            if !tx.is_coinbase() {
                for input in tx.inputs() {
                    let key = input.prev_tx.as_bytes();
                    let Some(raw) = self.tree.get(key)? else {
                        continue;
                    };
                    let entry: Entry = serde_json::from_slice(&raw)?;
                    let remainder: Entry = entry
                        .into_iter()
                        .filter(|(index, _)| i64::from(*index) != i64::from(input.vout))
                        .collect();

                    if remainder.is_empty() {
                        self.tree.remove(key)?;
                    } else {
                        self.tree.insert(key, serde_json::to_vec(&remainder)?)?;
                    }
                }
            }
        }

        for tx in block.transactions() {
            let entry: Entry = tx
                .outputs()
                .iter()
                .enumerate()
                .map(|(index, output)| (index as u32, output.clone()))
                .collect();
            self.tree
                .insert(tx.id().as_bytes(), serde_json::to_vec(&entry)?)?;
        }

        Ok(())
    }
}

fn decode_tx_id(raw: &[u8]) -> Result<TxId, StoreError> {
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("chainstate key of {} bytes", raw.len())))?;
    Ok(TxId(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{Transaction, SUBSIDY};
    use crate::crypto::KeyPair;
    use crate::wallet::Address;

    fn temp_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    fn seeded(db: &sled::Db, owner: &KeyPair) -> (UtxoSet, Block) {
        let utxos = UtxoSet::open(db).unwrap();
        let coinbase =
            Transaction::coinbase(&Address::from_pub_key_hash(owner.pub_key_hash()), None);
        let genesis = Block::genesis(coinbase);
        utxos.update(&genesis).unwrap();
        (utxos, genesis)
    }

    #[test]
    fn update_records_new_outputs() {
        let db = temp_db();
        let owner = KeyPair::generate();
        let (utxos, genesis) = seeded(&db, &owner);

        let (total, selected) = utxos
            .find_spendable_outputs(&owner.pub_key_hash(), SUBSIDY)
            .unwrap();
        assert_eq!(total, SUBSIDY);
        assert_eq!(selected, vec![(genesis.transactions()[0].id(), 0)]);
    }

    #[test]
    fn selection_accumulates_until_amount_is_covered() {
        let db = temp_db();
        let owner = KeyPair::generate();
        let (utxos, genesis) = seeded(&db, &owner);
        let address = Address::from_pub_key_hash(owner.pub_key_hash());

        let next = Block::new(genesis.id(), vec![Transaction::coinbase(&address, None)]);
        utxos.update(&next).unwrap();

        let (total, selected) = utxos
            .find_spendable_outputs(&owner.pub_key_hash(), SUBSIDY + 1)
            .unwrap();
        assert_eq!(total, 2 * SUBSIDY);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn exhausted_index_reports_what_it_found() {
        let db = temp_db();
        let owner = KeyPair::generate();
        let (utxos, _) = seeded(&db, &owner);

        let (total, selected) = utxos
            .find_spendable_outputs(&owner.pub_key_hash(), 1_000)
            .unwrap();
        assert_eq!(total, SUBSIDY);
        assert_eq!(selected.len(), 1);

        let stranger = KeyPair::generate();
        let (total, selected) = utxos
            .find_spendable_outputs(&stranger.pub_key_hash(), 1)
            .unwrap();
        assert_eq!(total, 0);
        assert!(selected.is_empty());
    }

    #[test]
    fn find_utxos_lists_outputs_for_a_hash_only() {
        let db = temp_db();
        let owner = KeyPair::generate();
        let (utxos, _) = seeded(&db, &owner);

        let outputs = utxos.find_utxos(&owner.pub_key_hash()).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].value, SUBSIDY);

        let stranger = KeyPair::generate();
        assert!(utxos.find_utxos(&stranger.pub_key_hash()).unwrap().is_empty());
    }

    #[test]
    fn spending_removes_consumed_entries() {
        let db = temp_db();
        let owner = KeyPair::generate();
        let receiver = KeyPair::generate();
        let (utxos, genesis) = seeded(&db, &owner);
        let funding = &genesis.transactions()[0];

        use crate::core::transaction::{TxInput, TxOutput};
        let spend = Transaction::new(
            vec![TxInput::new(funding.id(), 0, Some(owner.public_key_bytes()))],
            vec![
                TxOutput::new(4, receiver.pub_key_hash()),
                TxOutput::new(6, owner.pub_key_hash()),
            ],
        );
        let spend_id = spend.id();
        let block = Block::new(genesis.id(), vec![spend]);
        utxos.update(&block).unwrap();

        let entries = utxos.entries().unwrap();
        assert!(!entries.contains_key(&funding.id()));
        assert_eq!(entries[&spend_id].len(), 2);

        let (owner_total, _) = utxos
            .find_spendable_outputs(&owner.pub_key_hash(), u64::MAX)
            .unwrap();
        let (receiver_total, _) = utxos
            .find_spendable_outputs(&receiver.pub_key_hash(), u64::MAX)
            .unwrap();
        assert_eq!(owner_total, 6);
        assert_eq!(receiver_total, 4);
    }
}

//! Ledger façade and chain traversal
//!
//! Orchestrates mining, transaction verification and the signing of new
//! transactions against previously confirmed ones. The chain itself is a
//! backward-linked sequence of blocks reached through the block store,
//! one lookup per step; blocks are immutable once appended, so traversal
//! needs no locking.

use crate::core::block::{Block, BlockId};
use crate::core::transaction::{Transaction, TransactionError, TxId, TxOutput};
use crate::crypto::PubKeyHash;
use crate::storage::{BlockStore, StoreError};
use crate::wallet::Address;
use log::{error, info};
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Payload of the genesis coinbase transaction
pub const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

/// Ledger-level errors
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("no chain present in the block store")]
    EmptyChain,
    #[error("transaction {0} failed verification")]
    InvalidTransaction(TxId),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The ledger façade over an injected block store handle
#[derive(Debug)]
pub struct Blockchain {
    tip: BlockId,
    store: BlockStore,
}

impl Blockchain {
    /// Open the chain in `store`, bootstrapping a genesis block paying
    /// the subsidy to `address` when the store is empty
    pub fn create(store: BlockStore, address: &Address) -> Result<Self, BlockchainError> {
        match store.tip()? {
            Some(tip) => Ok(Self { tip, store }),
            None => {
                let coinbase =
                    Transaction::coinbase(address, Some(GENESIS_COINBASE_DATA.to_string()));
                let genesis = Block::genesis(coinbase);
                store.append(&genesis)?;
                info!("created chain with genesis block {}", genesis.id());
                Ok(Self {
                    tip: genesis.id(),
                    store,
                })
            }
        }
    }

    /// Resume an existing chain; fails when no block was ever appended
    pub fn open(store: BlockStore) -> Result<Self, BlockchainError> {
        let tip = store.tip()?.ok_or(BlockchainError::EmptyChain)?;
        Ok(Self { tip, store })
    }

    pub fn tip(&self) -> BlockId {
        self.tip
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// Verify every proposed transaction, mine a block over the current
    /// tip and append it.
    ///
    /// Any verification failure aborts the whole call; a block is never
    /// appended containing a transaction that failed. The caller is
    /// responsible for folding the returned block into the UTXO index.
    pub fn mine_block(&mut self, transactions: Vec<Transaction>) -> Result<Block, BlockchainError> {
        for tx in &transactions {
            if !self.verify_transaction(tx)? {
                error!("refusing to mine: transaction {} is invalid", tx.id());
                return Err(BlockchainError::InvalidTransaction(tx.id()));
            }
        }

        let tip = self.store.tip()?.ok_or(BlockchainError::EmptyChain)?;
        let block = Block::new(tip, transactions);
        self.store.append(&block)?;
        self.tip = block.id();
        info!("appended block {}", block.id());
        Ok(block)
    }

    /// Check a transaction's signatures against the confirmed
    /// transactions its inputs reference
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool, BlockchainError> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.resolve_inputs(tx)?;
        Ok(tx.verify(&prev_txs)?)
    }

    /// Sign a new transaction against the confirmed transactions its
    /// inputs reference
    pub fn sign_transaction(
        &self,
        tx: &mut Transaction,
        secret_key: &SecretKey,
    ) -> Result<(), BlockchainError> {
        let prev_txs = self.resolve_inputs(tx)?;
        tx.sign(secret_key, &prev_txs)?;
        Ok(())
    }

    /// Find a confirmed transaction by id, scanning tip to genesis
    pub fn find_transaction(&self, id: &TxId) -> Result<Option<Transaction>, StoreError> {
        for block in self.iter() {
            let block = block?;
            for tx in block.transactions() {
                if tx.id() == *id {
                    return Ok(Some(tx.clone()));
                }
            }
        }
        Ok(None)
    }

    fn resolve_inputs(
        &self,
        tx: &Transaction,
    ) -> Result<HashMap<TxId, Transaction>, BlockchainError> {
        let mut prev_txs = HashMap::new();
        for input in tx.inputs() {
            let prev = self
                .find_transaction(&input.prev_tx)?
                .ok_or(TransactionError::InvalidReference(input.prev_tx))?;
            prev_txs.insert(input.prev_tx, prev);
        }
        Ok(prev_txs)
    }

    /// Backward traversal from the tip to the genesis block
    pub fn iter(&self) -> ChainIterator {
        ChainIterator::new(self.store.clone(), Some(self.tip))
    }

    /// Every output in the chain not consumed by any confirmed
    /// non-coinbase input, grouped by transaction id. Input of the UTXO
    /// index rebuild.
    pub fn find_all_utxos(&self) -> Result<HashMap<TxId, Vec<(u32, TxOutput)>>, StoreError> {
        let mut spent: HashMap<TxId, Vec<i32>> = HashMap::new();
        for block in self.iter() {
            let block = block?;
            for tx in block.transactions() {
                if tx.is_coinbase() {
                    continue;
                }
                for input in tx.inputs() {
                    spent.entry(input.prev_tx).or_default().push(input.vout);
                }
            }
        }

        let mut utxos: HashMap<TxId, Vec<(u32, TxOutput)>> = HashMap::new();
        for block in self.iter() {
            let block = block?;
            for tx in block.transactions() {
                let spent_here = spent.get(&tx.id());
                for (index, output) in tx.outputs().iter().enumerate() {
                    let consumed = spent_here
                        .map(|indexes| indexes.contains(&(index as i32)))
                        .unwrap_or(false);
                    if !consumed {
                        utxos
                            .entry(tx.id())
                            .or_default()
                            .push((index as u32, output.clone()));
                    }
                }
            }
        }
        Ok(utxos)
    }

    /// Lazy tip-to-genesis scan for outputs locked to the holder of
    /// `public_key`, excluding any output later spent by an input whose
    /// stored key hashes to the same lock value. The slow fallback path, as opposed to the UTXO
    /// index; each call starts a fresh scan.
    pub fn unspent_outputs(&self, public_key: &[u8]) -> UnspentOutputs {
        UnspentOutputs {
            blocks: self.iter(),
            pub_key_hash: PubKeyHash::of_raw(public_key),
            ready: VecDeque::new(),
            spent: HashSet::new(),
            done: false,
        }
    }
}

/// Lazy backward block traversal.
///
/// Follows each block's previous-id link through the store until the null
/// sentinel; an absent tip yields an empty sequence. One store lookup per
/// step, nothing held in memory beyond the current position.
pub struct ChainIterator {
    store: BlockStore,
    next_id: BlockId,
    failed: bool,
}

impl ChainIterator {
    pub fn new(store: BlockStore, tip: Option<BlockId>) -> Self {
        Self {
            store,
            next_id: tip.unwrap_or(BlockId::NULL),
            failed: false,
        }
    }
}

impl Iterator for ChainIterator {
    type Item = Result<Block, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next_id.is_null() {
            return None;
        }
        match self.store.get(&self.next_id) {
            Ok(Some(block)) => {
                self.next_id = block.previous_id();
                Some(Ok(block))
            }
            Ok(None) => {
                self.failed = true;
                Some(Err(StoreError::MissingBlock(self.next_id)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// A confirmed, still-spendable output found by the slow-scan path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub tx_id: TxId,
    pub index: u32,
    pub output: TxOutput,
}

/// Iterator produced by [`Blockchain::unspent_outputs`]
pub struct UnspentOutputs {
    blocks: ChainIterator,
    pub_key_hash: PubKeyHash,
    ready: VecDeque<UnspentOutput>,
    spent: HashSet<(TxId, i32)>,
    done: bool,
}

impl UnspentOutputs {
    fn scan_block(&mut self, block: &Block) {
        for tx in block.transactions() {
            for (index, output) in tx.outputs().iter().enumerate() {
                if !output.is_locked_with(&self.pub_key_hash) {
                    continue;
                }
                // Skip outputs already consumed by a later block
                if self.spent.remove(&(tx.id(), index as i32)) {
                    continue;
                }
                self.ready.push_back(UnspentOutput {
                    tx_id: tx.id(),
                    index: index as u32,
                    output: output.clone(),
                });
            }

            if tx.is_coinbase() {
                continue;
            }
            for input in tx.inputs() {
                if input.uses_key(&self.pub_key_hash) {
                    self.spent.insert((input.prev_tx, input.vout));
                }
            }
        }
    }
}

impl Iterator for UnspentOutputs {
    type Item = Result<UnspentOutput, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(found) = self.ready.pop_front() {
                return Some(Ok(found));
            }
            if self.done {
                return None;
            }
            match self.blocks.next() {
                None => {
                    self.done = true;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(block)) => self.scan_block(&block),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::storage::BlockStore;

    fn temp_store() -> BlockStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        BlockStore::open(&db).unwrap()
    }

    fn new_address() -> (KeyPair, Address) {
        let kp = KeyPair::generate();
        let address = Address::from_pub_key_hash(kp.pub_key_hash());
        (kp, address)
    }

    #[test]
    fn create_bootstraps_a_genesis_block() {
        let store = temp_store();
        let (_, address) = new_address();

        let chain = Blockchain::create(store.clone(), &address).unwrap();
        assert_eq!(store.tip().unwrap(), Some(chain.tip()));

        let blocks: Vec<_> = chain.iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].transactions()[0].is_coinbase());
    }

    #[test]
    fn create_resumes_an_existing_chain() {
        let store = temp_store();
        let (_, address) = new_address();

        let first = Blockchain::create(store.clone(), &address).unwrap();
        let tip = first.tip();

        let resumed = Blockchain::create(store, &address).unwrap();
        assert_eq!(resumed.tip(), tip);
    }

    #[test]
    fn open_fails_on_an_empty_store() {
        let err = Blockchain::open(temp_store()).unwrap_err();
        assert!(matches!(err, BlockchainError::EmptyChain));
    }

    #[test]
    fn traversal_of_missing_tip_is_empty() {
        let iter = ChainIterator::new(temp_store(), None);
        assert_eq!(iter.count(), 0);
    }

    #[test]
    fn traversal_walks_tip_to_genesis() {
        let store = temp_store();
        let (_, address) = new_address();
        let mut chain = Blockchain::create(store, &address).unwrap();

        let reward = Transaction::coinbase(&address, None);
        let block = chain.mine_block(vec![reward]).unwrap();

        let blocks: Vec<_> = chain.iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id(), block.id());
        assert!(blocks[1].previous_id().is_null());
    }

    #[test]
    fn find_transaction_locates_confirmed_transactions() {
        let store = temp_store();
        let (_, address) = new_address();
        let chain = Blockchain::create(store, &address).unwrap();

        let genesis_tx = chain.iter().next().unwrap().unwrap().transactions()[0].clone();
        assert_eq!(
            chain.find_transaction(&genesis_tx.id()).unwrap(),
            Some(genesis_tx)
        );
        assert!(chain.find_transaction(&TxId([7u8; 32])).unwrap().is_none());
    }

    #[test]
    fn mining_rejects_a_transaction_with_unknown_inputs() {
        use crate::core::transaction::{TxInput, TxOutput};

        let store = temp_store();
        let (owner, address) = new_address();
        let mut chain = Blockchain::create(store, &address).unwrap();

        let bogus = Transaction::new(
            vec![TxInput::new(
                TxId([3u8; 32]),
                0,
                Some(owner.public_key_bytes()),
            )],
            vec![TxOutput::new(1, owner.pub_key_hash())],
        );

        let err = chain.mine_block(vec![bogus]).unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::Transaction(TransactionError::InvalidReference(_))
        ));
        // Nothing was appended
        assert_eq!(chain.iter().count(), 1);
    }

    #[test]
    fn mining_rejects_an_unsigned_spend() {
        use crate::core::transaction::{TxInput, TxOutput};

        let store = temp_store();
        let (owner, address) = new_address();
        let mut chain = Blockchain::create(store, &address).unwrap();
        let funding = chain.iter().next().unwrap().unwrap().transactions()[0].clone();

        let unsigned = Transaction::new(
            vec![TxInput::new(
                funding.id(),
                0,
                Some(owner.public_key_bytes()),
            )],
            vec![TxOutput::new(1, owner.pub_key_hash())],
        );

        let err = chain.mine_block(vec![unsigned]).unwrap_err();
        assert!(matches!(err, BlockchainError::InvalidTransaction(_)));
    }
}

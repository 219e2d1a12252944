//! Core ledger types: transactions, blocks and the chain façade

pub mod block;
pub mod blockchain;
pub mod transaction;

pub use block::{Block, BlockId};
pub use blockchain::{
    Blockchain, BlockchainError, ChainIterator, UnspentOutput, UnspentOutputs,
    GENESIS_COINBASE_DATA,
};
pub use transaction::{Transaction, TransactionError, TxId, TxInput, TxOutput, SUBSIDY};

//! Block repository over a sled tree
//!
//! Blocks are stored as JSON under `b<32-byte id>`; the single key `l`
//! holds the id of the chain tip. Appending a block writes both keys in
//! one atomic batch. Durability and on-disk layout are entirely this
//! module's concern; the core only sees ids and blocks.

use crate::core::block::{Block, BlockId};
use crate::storage::StoreError;

const TIP_KEY: &[u8] = b"l";
const BLOCK_PREFIX: u8 = b'b';
const TREE_NAME: &str = "blocks";

/// Handle to the block tree. Cheap to clone; all clones share the same
/// underlying storage.
#[derive(Clone, Debug)]
pub struct BlockStore {
    tree: sled::Tree,
}

impl BlockStore {
    /// Open the block tree inside an already-opened database
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            tree: db.open_tree(TREE_NAME)?,
        })
    }

    fn block_key(id: &BlockId) -> [u8; 33] {
        let mut key = [0u8; 33];
        key[0] = BLOCK_PREFIX;
        key[1..].copy_from_slice(id.as_bytes());
        key
    }

    /// Id of the current chain tip, if any block has been appended
    pub fn tip(&self) -> Result<Option<BlockId>, StoreError> {
        match self.tree.get(TIP_KEY)? {
            Some(raw) => Ok(Some(decode_id(&raw)?)),
            None => Ok(None),
        }
    }

    /// Append a block and move the tip to it, atomically
    pub fn append(&self, block: &Block) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(block)?;
        let mut batch = sled::Batch::default();
        batch.insert(&Self::block_key(&block.id())[..], encoded);
        batch.insert(TIP_KEY, &block.id().as_bytes()[..]);
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    /// Look up a block by id
    pub fn get(&self, id: &BlockId) -> Result<Option<Block>, StoreError> {
        match self.tree.get(Self::block_key(id))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }
}

fn decode_id(raw: &[u8]) -> Result<BlockId, StoreError> {
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("tip record of {} bytes", raw.len())))?;
    Ok(BlockId(bytes))
}

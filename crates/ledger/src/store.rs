//! Storage interface for blocks and chain status.
//!
//! The on-disk key-value engine lives outside the sync core; everything the
//! core needs from it fits behind [`Store`]. Implementations must make
//! `save_block` and `save_chain_status` individually atomic with respect to
//! crash recovery (a write batch or equivalent), so that the index rebuilt
//! by `load_block_index` never references a half-written block.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use aurum_core::{Block, Hash, TransactionStatus};
use tracing::warn;

use crate::block_index::{BlockIndex, BlockNode};
use crate::error::{LedgerError, LedgerResult};

/// Persisted pointer to the main-chain tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub height: u64,
    pub hash: Hash,
}

/// Persistence contract consumed by the chain state machine.
#[async_trait]
pub trait Store: Send + Sync {
    async fn block_exists(&self, hash: &Hash) -> bool;

    async fn get_block(&self, hash: &Hash) -> LedgerResult<Option<Block>>;

    /// The persisted main-chain tip, `None` for a virgin store.
    async fn get_store_status(&self) -> LedgerResult<Option<StoreStatus>>;

    async fn get_transaction_status(
        &self,
        block_hash: &Hash,
    ) -> LedgerResult<Option<TransactionStatus>>;

    /// Rebuilds the header index from every persisted block and points its
    /// main chain at the persisted status.
    async fn load_block_index(&self) -> LedgerResult<BlockIndex>;

    /// Persists a block together with its verify statuses.
    async fn save_block(&self, block: &Block, tx_status: &TransactionStatus) -> LedgerResult<()>;

    /// Persists the main-chain tip pointer.
    async fn save_chain_status(&self, node: &BlockNode) -> LedgerResult<()>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    blocks: HashMap<Hash, Block>,
    statuses: HashMap<Hash, TransactionStatus>,
    chain_status: Option<StoreStatus>,
}

/// Reference [`Store`] backed by process memory.
///
/// Used by tests and by deployments that rebuild from the network on every
/// start. Both save operations mutate under one write lock, which gives the
/// crash-atomicity contract trivially.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> LedgerResult<std::sync::RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| LedgerError::Storage {
            operation: "lock".into(),
            reason: "memory store lock poisoned".into(),
        })
    }

    fn write(&self) -> LedgerResult<std::sync::RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| LedgerError::Storage {
            operation: "lock".into(),
            reason: "memory store lock poisoned".into(),
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn block_exists(&self, hash: &Hash) -> bool {
        self.read()
            .map(|inner| inner.blocks.contains_key(hash))
            .unwrap_or(false)
    }

    async fn get_block(&self, hash: &Hash) -> LedgerResult<Option<Block>> {
        Ok(self.read()?.blocks.get(hash).cloned())
    }

    async fn get_store_status(&self) -> LedgerResult<Option<StoreStatus>> {
        Ok(self.read()?.chain_status)
    }

    async fn get_transaction_status(
        &self,
        block_hash: &Hash,
    ) -> LedgerResult<Option<TransactionStatus>> {
        Ok(self.read()?.statuses.get(block_hash).cloned())
    }

    async fn load_block_index(&self) -> LedgerResult<BlockIndex> {
        let inner = self.read()?;
        let mut headers: Vec<_> = inner.blocks.values().map(|b| b.header.clone()).collect();
        headers.sort_by_key(|h| h.height);

        let mut index = BlockIndex::new();
        for header in headers {
            let parent = if header.height == 0 {
                None
            } else {
                match index.get(&header.previous_block_hash) {
                    Some(parent) => Some(parent),
                    None => {
                        // A block whose parent never persisted cannot be
                        // reindexed; skip it rather than refuse to start.
                        warn!(
                            hash = %header.hash(),
                            height = header.height,
                            "skipping stored block with missing parent"
                        );
                        continue;
                    }
                }
            };
            index.add(header, parent)?;
        }

        if let Some(status) = inner.chain_status {
            let tip = index
                .get(&status.hash)
                .ok_or(LedgerError::Inconsistency {
                    reason: format!("persisted tip {} is not indexed", status.hash),
                })?;
            index.set_main_chain(tip);
        }
        Ok(index)
    }

    async fn save_block(&self, block: &Block, tx_status: &TransactionStatus) -> LedgerResult<()> {
        let hash = block.hash();
        let mut inner = self.write()?;
        inner.blocks.insert(hash, block.clone());
        inner.statuses.insert(hash, tx_status.clone());
        Ok(())
    }

    async fn save_chain_status(&self, node: &BlockNode) -> LedgerResult<()> {
        self.write()?.chain_status = Some(StoreStatus {
            height: node.height(),
            hash: node.hash,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurum_core::BlockHeader;

    fn chain_of(len: u64) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut prev = Hash::ZERO;
        for height in 0..len {
            let header = BlockHeader {
                version: 1,
                height,
                previous_block_hash: prev,
                timestamp: 1_700_000_000 + height,
                nonce: 0,
                bits: 0x2200_8000_0000_0000,
                transactions_merkle_root: Hash::ZERO,
                transaction_status_hash: Hash::ZERO,
            };
            prev = header.hash();
            blocks.push(Block {
                header,
                transactions: vec![],
            });
        }
        blocks
    }

    #[tokio::test]
    async fn save_and_reload_round_trip() {
        let store = MemoryStore::new();
        let blocks = chain_of(4);
        for block in &blocks {
            store
                .save_block(block, &TransactionStatus::default())
                .await
                .expect("save block");
        }

        let tip_hash = blocks[3].hash();
        assert!(store.block_exists(&tip_hash).await);
        assert_eq!(
            store.get_block(&tip_hash).await.expect("get block"),
            Some(blocks[3].clone())
        );

        let mut index = store.load_block_index().await.expect("load index");
        assert!(index.block_exists(&tip_hash));
        // No chain status saved yet, so no main chain.
        assert_eq!(index.best(), None);

        let tip = index.get(&tip_hash).expect("tip handle");
        index.set_main_chain(tip);
        store
            .save_chain_status(index.node(tip))
            .await
            .expect("save status");

        let reloaded = store.load_block_index().await.expect("reload index");
        assert_eq!(
            reloaded.best_node().map(|n| n.hash),
            Some(tip_hash),
            "main chain restored from persisted status"
        );
        assert_eq!(reloaded.main_chain_len(), 4);
    }

    #[tokio::test]
    async fn status_round_trip() {
        let store = MemoryStore::new();
        let blocks = chain_of(1);
        let mut status = TransactionStatus::default();
        status.set_status(0, true);
        store.save_block(&blocks[0], &status).await.expect("save");
        assert_eq!(
            store
                .get_transaction_status(&blocks[0].hash())
                .await
                .expect("get status"),
            Some(status)
        );
    }
}

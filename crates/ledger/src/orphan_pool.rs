//! Blocks waiting for a parent that has not arrived yet.
//!
//! Regular sync can deliver blocks out of order and fast sync can race the
//! regular path, so validated blocks whose `previous_block_hash` is unknown
//! park here together with their verify statuses until the parent lands.
//! The pool is bounded; when full, the oldest entry is evicted first.

use std::collections::{HashMap, HashSet, VecDeque};

use aurum_core::{Block, Hash, TransactionStatus};
use tracing::debug;

/// Default bound on the number of parked blocks.
pub const DEFAULT_MAX_ORPHANS: usize = 256;

/// A parked block, kept with the statuses it was verified with so promotion
/// can persist both.
#[derive(Debug, Clone)]
pub struct OrphanBlock {
    pub block: Block,
    pub tx_status: TransactionStatus,
}

/// Pool of orphan blocks indexed by hash and by missing parent.
#[derive(Debug)]
pub struct OrphanPool {
    by_hash: HashMap<Hash, OrphanBlock>,
    by_parent: HashMap<Hash, HashSet<Hash>>,
    /// Insertion order, oldest first, for eviction.
    order: VecDeque<Hash>,
    capacity: usize,
}

impl Default for OrphanPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ORPHANS)
    }
}

impl OrphanPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            by_hash: HashMap::new(),
            by_parent: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Parks a block. Re-adding a known orphan is a no-op.
    pub fn add(&mut self, block: Block, tx_status: TransactionStatus) {
        let hash = block.hash();
        if self.by_hash.contains_key(&hash) {
            return;
        }
        let parent = block.header.previous_block_hash;
        self.by_parent.entry(parent).or_default().insert(hash);
        self.by_hash.insert(hash, OrphanBlock { block, tx_status });
        self.order.push_back(hash);

        while self.by_hash.len() > self.capacity {
            if let Some(oldest) = self.order.front().copied() {
                debug!(hash = %oldest, "evicting oldest orphan block");
                self.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn get(&self, hash: &Hash) -> Option<&OrphanBlock> {
        self.by_hash.get(hash)
    }

    /// Hashes of parked blocks whose parent is `parent_hash`.
    pub fn children_of(&self, parent_hash: &Hash) -> Vec<Hash> {
        self.by_parent
            .get(parent_hash)
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Removes a block, purging both indexes.
    pub fn remove(&mut self, hash: &Hash) {
        let Some(orphan) = self.by_hash.remove(hash) else {
            return;
        };
        let parent = orphan.block.header.previous_block_hash;
        if let Some(children) = self.by_parent.get_mut(&parent) {
            children.remove(hash);
            if children.is_empty() {
                self.by_parent.remove(&parent);
            }
        }
        self.order.retain(|h| h != hash);
    }

    pub fn block_exists(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

//! In-memory index of every known block header.
//!
//! Nodes live in an arena owned by the index and reference their parents by
//! stable integer handles, so the parent DAG needs no reference counting and
//! no back-pointer cycles. Children are not stored; the rare reorg that
//! needs them recovers them by scanning.

use std::collections::HashMap;

use aurum_core::difficulty::{calc_work, SEED_PER_RETARGET};
use aurum_core::{BlockHeader, Hash};
use num_bigint::BigUint;

use crate::error::{LedgerError, LedgerResult};

/// Stable handle of a node inside a [`BlockIndex`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(usize);

/// One indexed header, with the chain-wide quantities derived on insertion.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub header: BlockHeader,
    /// Cached hash of `header`.
    pub hash: Hash,
    /// Parent node, `None` only for genesis.
    pub parent: Option<NodeHandle>,
    /// Cumulative proof-of-work from genesis through this node.
    pub work_sum: BigUint,
    /// Proof-of-work seed this node was mined under.
    pub seed: Hash,
}

impl BlockNode {
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Seed for the block following this node. A node opening a seed epoch
    /// contributes its own hash; every other node passes its seed along.
    pub fn calc_next_seed(&self) -> Hash {
        if self.header.height == 0 {
            return Hash::ZERO;
        }
        if self.header.height % SEED_PER_RETARGET == 0 {
            return self.hash;
        }
        self.seed
    }
}

/// Arena-backed index of headers by hash and, for the main chain, by height.
#[derive(Debug, Default)]
pub struct BlockIndex {
    nodes: Vec<BlockNode>,
    by_hash: HashMap<Hash, NodeHandle>,
    /// Main-chain node at each height, contiguous from genesis to the tip.
    main_chain: Vec<NodeHandle>,
    best: Option<NodeHandle>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a hash to its node handle.
    pub fn get(&self, hash: &Hash) -> Option<NodeHandle> {
        self.by_hash.get(hash).copied()
    }

    /// Borrows the node behind a handle. Handles never dangle: nodes are
    /// only ever appended to the arena.
    pub fn node(&self, handle: NodeHandle) -> &BlockNode {
        &self.nodes[handle.0]
    }

    /// The main-chain node at `height`, if the main chain reaches it.
    pub fn node_by_height(&self, height: u64) -> Option<NodeHandle> {
        self.main_chain.get(height as usize).copied()
    }

    pub fn block_exists(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Whether the hash names a node currently on the main chain.
    pub fn in_main_chain(&self, hash: &Hash) -> bool {
        self.get(hash)
            .and_then(|handle| {
                self.node_by_height(self.node(handle).height())
                    .map(|main| main == handle)
            })
            .unwrap_or(false)
    }

    /// Current best tip, set by [`BlockIndex::set_main_chain`].
    pub fn best(&self) -> Option<NodeHandle> {
        self.best
    }

    pub fn best_node(&self) -> Option<&BlockNode> {
        self.best.map(|handle| self.node(handle))
    }

    /// Number of main-chain entries; equals best height + 1 once a main
    /// chain exists.
    pub fn main_chain_len(&self) -> usize {
        self.main_chain.len()
    }

    /// Inserts a header into the arena without touching the main chain.
    ///
    /// `parent` must resolve the header's `previous_block_hash`; passing
    /// `None` is only valid for a genesis header in an empty index.
    pub fn add(&mut self, header: BlockHeader, parent: Option<NodeHandle>) -> LedgerResult<NodeHandle> {
        let hash = header.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(LedgerError::DuplicateBlock { hash });
        }

        let (work_sum, seed) = match parent {
            Some(parent_handle) => {
                let parent_node = self.node(parent_handle);
                if parent_node.hash != header.previous_block_hash {
                    return Err(LedgerError::UnknownParent {
                        hash,
                        parent: header.previous_block_hash,
                    });
                }
                if header.height != parent_node.height() + 1 {
                    return Err(LedgerError::HeightMismatch {
                        hash,
                        height: header.height,
                        parent_height: parent_node.height(),
                    });
                }
                (
                    parent_node.work_sum.clone() + calc_work(header.bits),
                    parent_node.calc_next_seed(),
                )
            }
            None => {
                if header.height != 0 || !self.nodes.is_empty() {
                    return Err(LedgerError::UnknownParent {
                        hash,
                        parent: header.previous_block_hash,
                    });
                }
                (calc_work(header.bits), Hash::ZERO)
            }
        };

        let handle = NodeHandle(self.nodes.len());
        self.nodes.push(BlockNode {
            header,
            hash,
            parent,
            work_sum,
            seed,
        });
        self.by_hash.insert(hash, handle);
        Ok(handle)
    }

    /// Rewrites the main chain to run from genesis to `tip` and moves the
    /// best pointer there. Must only be called from the chain state
    /// machine's single-writer region.
    pub fn set_main_chain(&mut self, tip: NodeHandle) {
        let tip_height = self.node(tip).height() as usize;
        self.main_chain.clear();
        self.main_chain.resize(tip_height + 1, tip);

        let mut cursor = Some(tip);
        while let Some(handle) = cursor {
            let node = &self.nodes[handle.0];
            self.main_chain[node.header.height as usize] = handle;
            cursor = node.parent;
        }
        self.best = Some(tip);
    }
}

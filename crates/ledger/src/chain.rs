//! The chain state machine.
//!
//! [`Chain`] is the only writer of the block index's best pointer, its
//! main-chain vector and the persisted chain status. Every block ingestion
//! goes through one request queue drained by a single worker task, which
//! gives a total order over state advances without fine-grained locking
//! inside the machine. Readers snapshot through a cheap read lock.

use std::sync::Arc;

use aurum_config::NetworkParams;
use aurum_core::{Block, BlockHeader, Hash, PowCache, TransactionStatus};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use crate::block_index::{BlockIndex, NodeHandle};
use crate::error::{LedgerError, LedgerResult};
use crate::orphan_pool::OrphanPool;
use crate::store::Store;
use crate::validation::validate_header;

/// Capacity of the ingestion queue. Large enough that submitters only block
/// when ingestion is genuinely behind.
const PROCESS_QUEUE_CAPACITY: usize = 1024;

struct ProcessBlockRequest {
    block: Block,
    tx_status: TransactionStatus,
    reply: oneshot::Sender<LedgerResult<bool>>,
}

struct ChainState {
    index: BlockIndex,
    orphans: OrphanPool,
}

/// Handle to the chain state machine.
///
/// Cheap to clone via `Arc`; dropping the last handle shuts the worker down
/// once its queue drains.
pub struct Chain {
    state: Arc<RwLock<ChainState>>,
    store: Arc<dyn Store>,
    params: Arc<NetworkParams>,
    pow_cache: Arc<PowCache>,
    process_tx: mpsc::Sender<ProcessBlockRequest>,
}

impl Chain {
    /// Opens the chain over `store`, bootstrapping genesis on a virgin
    /// store, and spawns the ingestion worker.
    pub async fn new(
        store: Arc<dyn Store>,
        params: Arc<NetworkParams>,
        pow_cache: Arc<PowCache>,
    ) -> LedgerResult<Arc<Self>> {
        let index = match store.get_store_status().await? {
            Some(_) => store.load_block_index().await?,
            None => {
                let genesis_block = Block {
                    header: params.genesis.clone(),
                    transactions: Vec::new(),
                };
                store
                    .save_block(&genesis_block, &TransactionStatus::default())
                    .await?;
                let mut index = BlockIndex::new();
                let genesis = index.add(params.genesis.clone(), None)?;
                index.set_main_chain(genesis);
                store.save_chain_status(index.node(genesis)).await?;
                info!(hash = %params.genesis_hash(), network = %params.network, "initialized chain at genesis");
                index
            }
        };

        let genesis_hash = params.genesis_hash();
        match index.node_by_height(0) {
            Some(handle) if index.node(handle).hash == genesis_hash => {}
            _ => {
                return Err(LedgerError::Inconsistency {
                    reason: format!("store genesis does not match network {}", params.network),
                })
            }
        }

        let state = Arc::new(RwLock::new(ChainState {
            index,
            orphans: OrphanPool::default(),
        }));
        let (process_tx, process_rx) = mpsc::channel(PROCESS_QUEUE_CAPACITY);

        let chain = Arc::new(Self {
            state: state.clone(),
            store: store.clone(),
            params: params.clone(),
            pow_cache: pow_cache.clone(),
            process_tx,
        });
        tokio::spawn(block_processor(state, store, pow_cache, process_rx));
        Ok(chain)
    }

    /// Submits a block for ingestion and waits for the verdict.
    ///
    /// Returns `Ok(true)` when the block was parked as an orphan, `Ok(false)`
    /// when it is connected (on the main chain or a side branch). Submitting
    /// an already-known block is not an error.
    pub async fn process_block(
        &self,
        block: Block,
        tx_status: TransactionStatus,
    ) -> LedgerResult<bool> {
        let (reply, verdict) = oneshot::channel();
        self.process_tx
            .send(ProcessBlockRequest {
                block,
                tx_status,
                reply,
            })
            .await
            .map_err(|_| LedgerError::WorkerClosed)?;
        verdict.await.map_err(|_| LedgerError::WorkerClosed)?
    }

    /// Runs `f` over the block index under the read lock.
    pub async fn with_index<R>(&self, f: impl FnOnce(&BlockIndex) -> R) -> R {
        let state = self.state.read().await;
        f(&state.index)
    }

    pub async fn best_header(&self) -> BlockHeader {
        let state = self.state.read().await;
        match state.index.best_node() {
            Some(node) => node.header.clone(),
            None => self.params.genesis.clone(),
        }
    }

    pub async fn best_height(&self) -> u64 {
        self.best_header().await.height
    }

    pub async fn best_hash(&self) -> Hash {
        self.best_header().await.hash()
    }

    /// Main-chain header at `height`.
    pub async fn header_by_height(&self, height: u64) -> Option<BlockHeader> {
        let state = self.state.read().await;
        state
            .index
            .node_by_height(height)
            .map(|handle| state.index.node(handle).header.clone())
    }

    pub async fn header_by_hash(&self, hash: &Hash) -> Option<BlockHeader> {
        let state = self.state.read().await;
        state
            .index
            .get(hash)
            .map(|handle| state.index.node(handle).header.clone())
    }

    pub async fn in_main_chain(&self, hash: &Hash) -> bool {
        self.state.read().await.index.in_main_chain(hash)
    }

    /// Whether the block is known at all, indexed or parked as an orphan.
    pub async fn block_exists(&self, hash: &Hash) -> bool {
        let state = self.state.read().await;
        state.index.block_exists(hash) || state.orphans.block_exists(hash)
    }

    pub async fn block_by_hash(&self, hash: &Hash) -> LedgerResult<Option<Block>> {
        self.store.get_block(hash).await
    }

    /// Main-chain block at `height`, resolved through the store.
    pub async fn block_by_height(&self, height: u64) -> LedgerResult<Option<Block>> {
        let hash = {
            let state = self.state.read().await;
            state
                .index
                .node_by_height(height)
                .map(|handle| state.index.node(handle).hash)
        };
        match hash {
            Some(hash) => self.store.get_block(&hash).await,
            None => Ok(None),
        }
    }

    pub async fn transaction_status(
        &self,
        block_hash: &Hash,
    ) -> LedgerResult<Option<TransactionStatus>> {
        self.store.get_transaction_status(block_hash).await
    }

    /// Proof-of-work seed for the block following `prev_hash`.
    pub async fn calc_next_seed(&self, prev_hash: &Hash) -> LedgerResult<Hash> {
        let state = self.state.read().await;
        let handle = state
            .index
            .get(prev_hash)
            .ok_or(LedgerError::BlockNotFound { hash: *prev_hash })?;
        Ok(state.index.node(handle).calc_next_seed())
    }

    /// Difficulty bits required for the block following `prev_hash`.
    pub async fn calc_next_bits(&self, prev_hash: &Hash) -> LedgerResult<u64> {
        let state = self.state.read().await;
        let handle = state
            .index
            .get(prev_hash)
            .ok_or(LedgerError::BlockNotFound { hash: *prev_hash })?;
        crate::validation::expected_bits(&state.index, handle)
    }

    /// Serves headers after the first locator entry found on the main
    /// chain, bounded by `max_headers` and by the height of `stop_hash`.
    pub async fn locate_headers(
        &self,
        locator: &[Hash],
        stop_hash: &Hash,
        max_headers: u64,
    ) -> LedgerResult<Vec<BlockHeader>> {
        let state = self.state.read().await;
        let index = &state.index;

        let stop = index
            .get(stop_hash)
            .ok_or(LedgerError::BlockNotFound { hash: *stop_hash })?;
        let stop_height = index.node(stop).height();

        let mut start_height = 0;
        for hash in locator {
            if index.in_main_chain(hash) {
                if let Some(handle) = index.get(hash) {
                    start_height = index.node(handle).height();
                    break;
                }
            }
        }

        let total = stop_height.saturating_sub(start_height).min(max_headers);
        let mut headers = Vec::with_capacity(total as usize);
        for offset in 1..=total {
            match index.node_by_height(start_height + offset) {
                Some(handle) => headers.push(index.node(handle).header.clone()),
                None => break,
            }
        }
        Ok(headers)
    }

    /// Block-body counterpart of [`Chain::locate_headers`].
    pub async fn locate_blocks(
        &self,
        locator: &[Hash],
        stop_hash: &Hash,
        max_blocks: u64,
    ) -> LedgerResult<Vec<Block>> {
        let headers = self.locate_headers(locator, stop_hash, max_blocks).await?;
        let mut blocks = Vec::with_capacity(headers.len());
        for header in headers {
            let hash = header.hash();
            let block = self
                .store
                .get_block(&hash)
                .await?
                .ok_or(LedgerError::BlockNotFound { hash })?;
            blocks.push(block);
        }
        Ok(blocks)
    }
}

/// Attach and detach lists for moving the main chain to `tip`: `attach` runs
/// from just above the common ancestor down to `tip` in chain order,
/// `detach` runs from the current best back to just above the ancestor.
/// Both are empty when `tip` extends the current best.
pub fn calc_reorganize_nodes(
    index: &BlockIndex,
    tip: NodeHandle,
) -> (Vec<NodeHandle>, Vec<NodeHandle>) {
    let mut attach = std::collections::VecDeque::new();
    let mut cursor = tip;
    loop {
        let node = index.node(cursor);
        if index.node_by_height(node.height()) == Some(cursor) {
            break;
        }
        attach.push_front(cursor);
        match node.parent {
            Some(parent) => cursor = parent,
            None => break,
        }
    }
    let ancestor = cursor;

    let mut detach = Vec::new();
    let mut current = index.best();
    while let Some(handle) = current {
        if handle == ancestor {
            break;
        }
        detach.push(handle);
        current = index.node(handle).parent;
    }
    (attach.into_iter().collect(), detach)
}

async fn block_processor(
    state: Arc<RwLock<ChainState>>,
    store: Arc<dyn Store>,
    pow_cache: Arc<PowCache>,
    mut rx: mpsc::Receiver<ProcessBlockRequest>,
) {
    while let Some(request) = rx.recv().await {
        let verdict = process_block(
            &state,
            store.as_ref(),
            pow_cache.as_ref(),
            request.block,
            request.tx_status,
        )
        .await;
        if request.reply.send(verdict).is_err() {
            debug!("block submitter went away before the verdict");
        }
    }
    debug!("block processor drained, shutting down");
}

async fn process_block(
    state: &RwLock<ChainState>,
    store: &dyn Store,
    pow_cache: &PowCache,
    block: Block,
    tx_status: TransactionStatus,
) -> LedgerResult<bool> {
    let mut state = state.write().await;
    let hash = block.hash();

    if state.index.block_exists(&hash) || state.orphans.block_exists(&hash) {
        debug!(hash = %hash, height = block.height(), "block has already been processed");
        return Ok(state.orphans.block_exists(&hash));
    }

    let Some(parent) = state.index.get(&block.header.previous_block_hash) else {
        debug!(hash = %hash, height = block.height(), "parking block with unknown parent");
        state.orphans.add(block, tx_status);
        return Ok(true);
    };

    save_block(&mut state, store, pow_cache, parent, &block, &tx_status).await?;
    let best_candidate = save_descendants(&mut state, store, pow_cache, hash).await?;

    let candidate = state
        .index
        .get(&best_candidate)
        .ok_or(LedgerError::Inconsistency {
            reason: format!("promoted block {best_candidate} vanished from the index"),
        })?;
    let best = state.index.best().ok_or(LedgerError::Inconsistency {
        reason: "index has no best node".into(),
    })?;

    if state.index.node(candidate).parent == Some(best) {
        debug!(hash = %best_candidate, "appending block to the end of the main chain");
        set_state(&mut state, store, candidate).await?;
        return Ok(false);
    }

    let (candidate_height, should_reorg) = {
        let candidate_node = state.index.node(candidate);
        let best_node = state.index.node(best);
        (
            candidate_node.height(),
            candidate_node.height() > best_node.height()
                && candidate_node.work_sum >= best_node.work_sum,
        )
    };
    if should_reorg {
        info!(
            height = candidate_height,
            hash = %best_candidate,
            "reorganizing to a heavier branch"
        );
        set_state(&mut state, store, candidate).await?;
        return Ok(false);
    }

    debug!(hash = %hash, "block accepted on a side branch");
    Ok(false)
}

/// Validates, persists and indexes one block whose parent is known. State
/// is only touched after the store accepts the block.
async fn save_block(
    state: &mut ChainState,
    store: &dyn Store,
    pow_cache: &PowCache,
    parent: NodeHandle,
    block: &Block,
    tx_status: &TransactionStatus,
) -> LedgerResult<()> {
    validate_header(&state.index, parent, &block.header, pow_cache)?;
    store.save_block(block, tx_status).await?;

    let hash = block.hash();
    state.orphans.remove(&hash);
    state.index.add(block.header.clone(), Some(parent))?;
    Ok(())
}

/// Promotes every orphan now reachable from `start`, depth first, and
/// returns the hash of the deepest block reached (possibly `start` itself).
async fn save_descendants(
    state: &mut ChainState,
    store: &dyn Store,
    pow_cache: &PowCache,
    start: Hash,
) -> LedgerResult<Hash> {
    let mut best = start;
    let mut best_height = match state.index.get(&start) {
        Some(handle) => state.index.node(handle).height(),
        None => 0,
    };

    let mut pending = vec![start];
    while let Some(parent_hash) = pending.pop() {
        for child_hash in state.orphans.children_of(&parent_hash) {
            let Some((block, tx_status)) = state
                .orphans
                .get(&child_hash)
                .map(|o| (o.block.clone(), o.tx_status.clone()))
            else {
                continue;
            };
            let Some(parent) = state.index.get(&parent_hash) else {
                continue;
            };
            match save_block(state, store, pow_cache, parent, &block, &tx_status).await {
                Ok(()) => {
                    if block.height() > best_height {
                        best_height = block.height();
                        best = child_hash;
                    }
                    pending.push(child_hash);
                }
                Err(err @ LedgerError::Storage { .. }) => {
                    // Leave the orphan parked; persistence may recover.
                    warn!(err = %err, hash = %child_hash, "failed to persist promoted orphan");
                }
                Err(err) => {
                    warn!(err = %err, hash = %child_hash, "dropping invalid orphan");
                    state.orphans.remove(&child_hash);
                }
            }
        }
    }
    Ok(best)
}

/// Moves the main chain to `tip`: persists the new chain status first, then
/// flips the index in one step.
async fn set_state(state: &mut ChainState, store: &dyn Store, tip: NodeHandle) -> LedgerResult<()> {
    let (attach, detach) = calc_reorganize_nodes(&state.index, tip);
    if !detach.is_empty() {
        info!(
            attach = attach.len(),
            detach = detach.len(),
            tip = %state.index.node(tip).hash,
            "rewriting main chain"
        );
    }
    store.save_chain_status(state.index.node(tip)).await?;
    state.index.set_main_chain(tip);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreStatus};
    use async_trait::async_trait;
    use aurum_core::difficulty::solve;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn test_params() -> Arc<NetworkParams> {
        Arc::new(NetworkParams::devnet())
    }

    /// Child block of `parent` with empty body. `tag` disambiguates
    /// siblings forked off the same parent.
    fn mine_child(parent: &BlockHeader, tag: u64) -> Block {
        let mut header = BlockHeader {
            version: 1,
            height: parent.height + 1,
            previous_block_hash: parent.hash(),
            timestamp: parent.timestamp + 1 + tag,
            nonce: 0,
            bits: parent.bits,
            transactions_merkle_root: Hash::ZERO,
            transaction_status_hash: Hash::ZERO,
        };
        solve(&mut header, &Hash::ZERO);
        Block {
            header,
            transactions: Vec::new(),
        }
    }

    fn mine_chain(from: &BlockHeader, len: usize, tag: u64) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(len);
        let mut parent = from.clone();
        for _ in 0..len {
            let block = mine_child(&parent, tag);
            parent = block.header.clone();
            blocks.push(block);
        }
        blocks
    }

    async fn new_chain() -> (Arc<Chain>, Arc<MemoryStore>, Arc<NetworkParams>) {
        let store = Arc::new(MemoryStore::new());
        let params = test_params();
        let chain = Chain::new(store.clone(), params.clone(), Arc::new(PowCache::new()))
            .await
            .expect("open chain");
        (chain, store, params)
    }

    async fn assert_height_invariants(chain: &Chain) {
        chain
            .with_index(|index| {
                let best = index.best_node().expect("best node");
                assert_eq!(index.main_chain_len() as u64, best.height() + 1);
                let by_height = index
                    .node_by_height(best.height())
                    .expect("main chain node at best height");
                assert_eq!(index.node(by_height).hash, best.hash);
            })
            .await;
    }

    #[tokio::test]
    async fn appends_in_order() {
        let (chain, _store, params) = new_chain().await;
        let blocks = mine_chain(&params.genesis, 3, 0);
        for block in &blocks {
            let orphan = chain
                .process_block(block.clone(), TransactionStatus::default())
                .await
                .expect("process block");
            assert!(!orphan);
        }
        assert_eq!(chain.best_height().await, 3);
        assert_eq!(chain.best_hash().await, blocks[2].hash());
        assert_eq!(
            chain
                .calc_next_bits(&chain.best_hash().await)
                .await
                .expect("next bits"),
            params.genesis.bits,
            "bits carry over off a retarget boundary"
        );
        assert_eq!(
            chain
                .calc_next_seed(&chain.best_hash().await)
                .await
                .expect("next seed"),
            Hash::ZERO
        );
        assert_height_invariants(&chain).await;
    }

    #[tokio::test]
    async fn resubmission_is_idempotent() {
        let (chain, _store, params) = new_chain().await;
        let blocks = mine_chain(&params.genesis, 2, 0);
        for block in &blocks {
            chain
                .process_block(block.clone(), TransactionStatus::default())
                .await
                .expect("first submission");
        }
        let snapshot = chain.best_hash().await;

        for block in &blocks {
            let orphan = chain
                .process_block(block.clone(), TransactionStatus::default())
                .await
                .expect("resubmission");
            assert!(!orphan);
        }
        assert_eq!(chain.best_hash().await, snapshot);
        assert_height_invariants(&chain).await;
    }

    #[tokio::test]
    async fn orphans_promote_in_reverse_submission_order() {
        let (chain, _store, params) = new_chain().await;
        let blocks = mine_chain(&params.genesis, 3, 0);

        let orphan = chain
            .process_block(blocks[2].clone(), TransactionStatus::default())
            .await
            .expect("submit b3");
        assert!(orphan);
        let orphan = chain
            .process_block(blocks[1].clone(), TransactionStatus::default())
            .await
            .expect("submit b2");
        assert!(orphan);
        let orphan = chain
            .process_block(blocks[0].clone(), TransactionStatus::default())
            .await
            .expect("submit b1");
        assert!(!orphan);

        assert_eq!(chain.best_hash().await, blocks[2].hash());
        let state = chain.state.read().await;
        assert!(state.orphans.is_empty(), "orphan pool fully drained");
        drop(state);
        assert_height_invariants(&chain).await;
    }

    #[tokio::test]
    async fn heavier_branch_triggers_reorganization() {
        let (chain, _store, params) = new_chain().await;
        let branch_a = mine_chain(&params.genesis, 3, 0);
        for block in &branch_a {
            chain
                .process_block(block.clone(), TransactionStatus::default())
                .await
                .expect("branch a");
        }

        let branch_b = mine_chain(&params.genesis, 4, 7);
        // Equal length is a side branch, not a reorg.
        for block in &branch_b[..3] {
            let orphan = chain
                .process_block(block.clone(), TransactionStatus::default())
                .await
                .expect("branch b prefix");
            assert!(!orphan);
        }
        assert_eq!(chain.best_hash().await, branch_a[2].hash());

        // Attach/detach for moving to b3 while a3 is still best meet at
        // genesis.
        chain
            .with_index(|index| {
                let b3 = index.get(&branch_b[2].hash()).expect("b3 indexed");
                let (attach, detach) = calc_reorganize_nodes(index, b3);
                let attach_hashes: Vec<Hash> =
                    attach.iter().map(|&h| index.node(h).hash).collect();
                let detach_hashes: Vec<Hash> =
                    detach.iter().map(|&h| index.node(h).hash).collect();
                assert_eq!(
                    attach_hashes,
                    branch_b[..3].iter().map(|b| b.hash()).collect::<Vec<_>>()
                );
                assert_eq!(
                    detach_hashes,
                    branch_a.iter().rev().map(|b| b.hash()).collect::<Vec<_>>()
                );
            })
            .await;

        // The fourth block tips the balance.
        let orphan = chain
            .process_block(branch_b[3].clone(), TransactionStatus::default())
            .await
            .expect("branch b tip");
        assert!(!orphan);
        assert_eq!(chain.best_hash().await, branch_b[3].hash());
        for (height, block) in branch_b.iter().enumerate() {
            assert_eq!(
                chain.header_by_height(height as u64 + 1).await.map(|h| h.hash()),
                Some(block.hash())
            );
            assert!(chain.in_main_chain(&block.hash()).await);
        }
        for block in &branch_a {
            assert!(!chain.in_main_chain(&block.hash()).await);
        }
        assert_height_invariants(&chain).await;
    }

    #[tokio::test]
    async fn invalid_header_is_rejected() {
        let (chain, _store, params) = new_chain().await;
        let mut block = mine_chain(&params.genesis, 1, 0).remove(0);
        block.header.bits = block.header.bits.wrapping_sub(1);
        let result = chain
            .process_block(block, TransactionStatus::default())
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidHeader { .. })));
        assert_eq!(chain.best_height().await, 0);
    }

    #[tokio::test]
    async fn locate_headers_walks_from_the_locator_fork_point() {
        let (chain, _store, params) = new_chain().await;
        let blocks = mine_chain(&params.genesis, 6, 0);
        for block in &blocks {
            chain
                .process_block(block.clone(), TransactionStatus::default())
                .await
                .expect("process");
        }

        let locator = vec![blocks[2].hash()];
        let stop = blocks[5].hash();
        let headers = chain
            .locate_headers(&locator, &stop, 128)
            .await
            .expect("locate");
        assert_eq!(
            headers.iter().map(|h| h.hash()).collect::<Vec<_>>(),
            blocks[3..6].iter().map(|b| b.hash()).collect::<Vec<_>>()
        );

        // An unknown locator entry falls back to genesis.
        let headers = chain
            .locate_headers(&[Hash::new([9; 32])], &stop, 2)
            .await
            .expect("locate from genesis");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].hash(), blocks[0].hash());

        let blocks_served = chain
            .locate_blocks(&locator, &stop, 128)
            .await
            .expect("locate blocks");
        assert_eq!(blocks_served, blocks[3..6].to_vec());
    }

    #[tokio::test]
    async fn reopening_restores_the_persisted_tip() {
        let store = Arc::new(MemoryStore::new());
        let params = test_params();
        {
            let chain = Chain::new(store.clone(), params.clone(), Arc::new(PowCache::new()))
                .await
                .expect("open chain");
            for block in mine_chain(&params.genesis, 5, 0) {
                chain
                    .process_block(block, TransactionStatus::default())
                    .await
                    .expect("process");
            }
            assert_eq!(chain.best_height().await, 5);
        }

        let reopened = Chain::new(store, params, Arc::new(PowCache::new()))
            .await
            .expect("reopen chain");
        assert_eq!(reopened.best_height().await, 5);
        assert_height_invariants(&reopened).await;
    }

    /// Store whose save path can be switched off to exercise storage
    /// failure handling.
    struct FlakyStore {
        inner: MemoryStore,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn block_exists(&self, hash: &Hash) -> bool {
            self.inner.block_exists(hash).await
        }
        async fn get_block(&self, hash: &Hash) -> LedgerResult<Option<Block>> {
            self.inner.get_block(hash).await
        }
        async fn get_store_status(&self) -> LedgerResult<Option<StoreStatus>> {
            self.inner.get_store_status().await
        }
        async fn get_transaction_status(
            &self,
            block_hash: &Hash,
        ) -> LedgerResult<Option<TransactionStatus>> {
            self.inner.get_transaction_status(block_hash).await
        }
        async fn load_block_index(&self) -> LedgerResult<BlockIndex> {
            self.inner.load_block_index().await
        }
        async fn save_block(
            &self,
            block: &Block,
            tx_status: &TransactionStatus,
        ) -> LedgerResult<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(LedgerError::Storage {
                    operation: "save_block".into(),
                    reason: "injected failure".into(),
                });
            }
            self.inner.save_block(block, tx_status).await
        }
        async fn save_chain_status(&self, node: &BlockNode) -> LedgerResult<()> {
            self.inner.save_chain_status(node).await
        }
    }

    use crate::block_index::BlockNode;

    #[tokio::test]
    async fn storage_failure_leaves_the_index_untouched() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail_saves: AtomicBool::new(false),
        });
        let params = test_params();
        let chain = Chain::new(store.clone(), params.clone(), Arc::new(PowCache::new()))
            .await
            .expect("open chain");
        let blocks = mine_chain(&params.genesis, 2, 0);

        store.fail_saves.store(true, Ordering::SeqCst);
        let result = chain
            .process_block(blocks[0].clone(), TransactionStatus::default())
            .await;
        assert!(matches!(result, Err(LedgerError::Storage { .. })));
        assert_eq!(chain.best_height().await, 0);
        assert!(!chain.block_exists(&blocks[0].hash()).await);

        // Recovery: the same block goes through once the store heals.
        store.fail_saves.store(false, Ordering::SeqCst);
        let orphan = chain
            .process_block(blocks[0].clone(), TransactionStatus::default())
            .await
            .expect("retry after recovery");
        assert!(!orphan);
        assert_eq!(chain.best_height().await, 1);
    }
}

//! The block synchronization engine.
//!
//! One worker task runs a periodic sync cycle. Each cycle picks exactly one
//! mode: checkpoint-bounded fast sync when a qualified peer can serve the
//! next checkpoint, otherwise regular per-block sync against the best full
//! node. All requests are correlated by `(peer_id, kind)` through the four
//! reply mailboxes and bounded by the sync timeout; any peer-attributable
//! failure sidelines the peer and the next cycle starts over with another.

use std::sync::Arc;

use aurum_config::{
    Checkpoint, NetworkParams, ServiceFlags, BLOCK_LOCATOR_DENSE_PREFIX, MAX_BLOCKS_PER_MSG,
    MAX_BLOCK_HEADERS_PER_MSG, SYNC_CYCLE, SYNC_TIMEOUT,
};
use aurum_core::{
    validate_status_merkle_proof, validate_tx_merkle_proof, Block, BlockHeader, Hash, MerkleBlock,
    PowCache, TransactionStatus, TxVerifyResult,
};
use aurum_ledger::Chain;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{NetworkError, NetworkResult};
use crate::header_list::HeaderList;
use crate::peers::{PeerSet, SyncPeer};
use crate::transport::{sync_channels, SyncInbox, SyncMailbox};

/// Tunables of the sync engine. Production uses the protocol defaults;
/// tests shrink the timings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between sync cycles.
    pub cycle: Duration,
    /// Deadline for each outstanding request.
    pub request_timeout: Duration,
    /// Cap on blocks fetched per regular-sync pass.
    pub max_blocks_per_msg: u64,
    /// Cap on headers accepted per header batch.
    pub max_headers_per_msg: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cycle: SYNC_CYCLE,
            request_timeout: SYNC_TIMEOUT,
            max_blocks_per_msg: MAX_BLOCKS_PER_MSG,
            max_headers_per_msg: MAX_BLOCK_HEADERS_PER_MSG,
        }
    }
}

/// Handle to a spawned sync worker.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Signals the worker to stop and waits for it to exit at the next
    /// cycle boundary. Outstanding requests are abandoned; their timeouts
    /// bound any leftover waiting.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(err = %err, "sync worker terminated abnormally");
        }
    }
}

/// Drives the node's view of the chain towards the network tip.
pub struct SyncEngine {
    chain: Arc<Chain>,
    peers: Arc<PeerSet>,
    params: Arc<NetworkParams>,
    pow_cache: Arc<PowCache>,
    config: SyncConfig,
    inbox: SyncInbox,
    header_list: HeaderList,
    sync_peer: Option<SyncPeer>,
}

impl SyncEngine {
    /// Creates an engine with the protocol defaults, returning the mailbox
    /// the transport layer pushes replies into.
    pub fn new(
        chain: Arc<Chain>,
        peers: Arc<PeerSet>,
        params: Arc<NetworkParams>,
        pow_cache: Arc<PowCache>,
    ) -> (Self, SyncMailbox) {
        Self::with_config(chain, peers, params, pow_cache, SyncConfig::default())
    }

    pub fn with_config(
        chain: Arc<Chain>,
        peers: Arc<PeerSet>,
        params: Arc<NetworkParams>,
        pow_cache: Arc<PowCache>,
        config: SyncConfig,
    ) -> (Self, SyncMailbox) {
        let (mailbox, inbox) = sync_channels();
        (
            Self {
                chain,
                peers,
                params,
                pow_cache,
                config,
                inbox,
                header_list: HeaderList::new(),
                sync_peer: None,
            },
            mailbox,
        )
    }

    /// Spawns the periodic sync worker.
    pub fn spawn(self) -> SyncHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SyncHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.cycle);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(cycle = ?self.config.cycle, "sync worker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.sync_once().await {
                        self.announce_tip().await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("sync worker stopped");
    }

    /// Runs one sync cycle. Returns whether the local chain advanced.
    pub async fn sync_once(&mut self) -> bool {
        if let Some(checkpoint) = self.next_checkpoint().await {
            let required = ServiceFlags::FAST_SYNC | ServiceFlags::FULL_NODE;
            if let Some(peer) = self.peers.best_peer(required).await {
                if peer.tip_height >= checkpoint.height {
                    let peer_id = peer.id.clone();
                    self.sync_peer = Some(peer);
                    return match self.fast_block_sync(&checkpoint).await {
                        Ok(()) => true,
                        Err(err) => {
                            warn!(err = %err, peer = %peer_id, "fast block sync failed");
                            self.handle_sync_error(&peer_id, &err).await;
                            false
                        }
                    };
                }
            }
        }

        let best_height = self.chain.best_height().await;
        let Some(peer) = self.peers.best_peer(ServiceFlags::FULL_NODE).await else {
            return false;
        };
        if peer.tip_height <= best_height {
            return false;
        }
        let target_height = peer
            .tip_height
            .min(best_height + self.config.max_blocks_per_msg);
        let peer_id = peer.id.clone();
        self.sync_peer = Some(peer);
        match self.regular_block_sync(target_height).await {
            Ok(()) => true,
            Err(err) => {
                warn!(err = %err, peer = %peer_id, "regular block sync failed");
                self.handle_sync_error(&peer_id, &err).await;
                false
            }
        }
    }

    async fn handle_sync_error(&self, peer_id: &str, err: &NetworkError) {
        if err.is_peer_fault() {
            self.peers.error_handler(peer_id, err).await;
        } else {
            error!(err = %err, "sync halted by local failure");
        }
    }

    /// Broadcasts the new tip to peers after a successful sync pass.
    async fn announce_tip(&self) {
        let best = self.chain.best_header().await;
        match self.chain.block_by_hash(&best.hash()).await {
            Ok(Some(block)) => self.peers.broadcast_mined_block(&block).await,
            Ok(None) => warn!(hash = %best.hash(), "best block missing from store"),
            Err(err) => warn!(err = %err, "failed to load best block for broadcast"),
        }
        self.peers
            .broadcast_new_status(&best, self.params.genesis_hash())
            .await;
    }

    /// The first checkpoint strictly above the current best height, or
    /// `None` once the chain has passed the last one.
    pub async fn next_checkpoint(&self) -> Option<Checkpoint> {
        let best_height = self.chain.best_height().await;
        let last = self.params.checkpoints.last()?;
        if best_height >= last.height {
            return None;
        }
        self.params
            .checkpoints
            .iter()
            .find(|cp| cp.height > best_height)
            .cloned()
    }

    /// Compact list of main-chain hashes a peer can use to find the common
    /// ancestor: dense near the tip, then doubling steps back to genesis.
    pub async fn block_locator(&self) -> Vec<Hash> {
        let mut locator = Vec::new();
        let mut header = Some(self.chain.best_header().await);
        let mut step = 1u64;
        while let Some(current) = header {
            locator.push(current.hash());
            if current.height == 0 {
                break;
            }
            let next_height = current.height.saturating_sub(step);
            header = self.chain.header_by_height(next_height).await;
            if locator.len() >= BLOCK_LOCATOR_DENSE_PREFIX {
                step = step.saturating_mul(2);
            }
        }
        locator
    }

    /// Header-first sync up to `checkpoint`.
    ///
    /// Chains headers from the local best to the checkpoint first, refusing
    /// any branch that reaches the checkpoint height with a different hash,
    /// then fetches and verifies each body as a merkle block. Bodies under
    /// the checkpoint are stamped into the proof-of-work cache so the chain
    /// does not re-run the expensive hash.
    async fn fast_block_sync(&mut self, checkpoint: &Checkpoint) -> NetworkResult<()> {
        let anchor = self.chain.best_header().await;
        self.header_list.reset_from(Some(anchor));

        loop {
            let back = match self.header_list.back() {
                Some(header) => header.clone(),
                None => {
                    return Err(NetworkError::PeerMisbehave {
                        reason: "header working list lost its anchor".into(),
                    })
                }
            };
            if back.hash() == checkpoint.hash {
                break;
            }
            if back.height >= checkpoint.height {
                return Err(NetworkError::PeerMisbehave {
                    reason: "peer is not in the checkpoint branch".into(),
                });
            }

            let headers = self
                .require_headers(vec![back.hash()], checkpoint.hash)
                .await?;
            if headers.is_empty() {
                return Err(NetworkError::PeerMisbehave {
                    reason: "peer returned an empty header batch".into(),
                });
            }
            if headers.len() as u64 > self.config.max_headers_per_msg {
                return Err(NetworkError::PeerMisbehave {
                    reason: "peer exceeded the header batch limit".into(),
                });
            }
            self.header_list.append(headers)?;
        }

        // Body fetch, starting at the first header after the local best.
        let mut index = 1;
        while self.chain.best_height().await <= checkpoint.height {
            let header = match self.header_list.get(index) {
                Some(header) => header.clone(),
                None => return Ok(()),
            };
            let hash = header.hash();

            let merkle_block = self.require_merkle_block(header.height, Some(hash)).await?;
            if merkle_block.hash() != hash {
                return Err(NetworkError::PeerMisbehave {
                    reason: "merkle block does not match the requested header".into(),
                });
            }
            let tx_status = verify_merkle_block(&merkle_block)?;

            let seed = self
                .chain
                .calc_next_seed(&header.previous_block_hash)
                .await?;
            self.pow_cache.insert(hash, seed);
            let result = self
                .chain
                .process_block(merkle_block.to_block(), tx_status)
                .await;
            self.pow_cache.remove(&hash, &seed);
            result?;

            index += 1;
        }
        Ok(())
    }

    /// Per-block sync up to `target_height`, one merkle block at a time.
    ///
    /// An orphan verdict means the parent is still missing, so the cursor
    /// steps back one height and retries; otherwise it snaps back to just
    /// above the (possibly advanced) local best.
    async fn regular_block_sync(&mut self, target_height: u64) -> NetworkResult<()> {
        let mut height = self.chain.best_height().await + 1;
        while height <= target_height {
            let merkle_block = self.require_merkle_block(height, None).await?;
            let tx_status = verify_merkle_block(&merkle_block)?;
            let is_orphan = self
                .chain
                .process_block(merkle_block.to_block(), tx_status)
                .await?;
            if is_orphan {
                height = height.saturating_sub(1);
                continue;
            }
            height = self.chain.best_height().await + 1;
        }
        Ok(())
    }

    fn current_peer(&self) -> NetworkResult<SyncPeer> {
        self.sync_peer.clone().ok_or(NetworkError::PeerDropped)
    }

    fn timeout_error(&self, request: &'static str) -> NetworkError {
        NetworkError::RequestTimeout {
            request,
            timeout_ms: self.config.request_timeout.as_millis() as u64,
        }
    }

    /// Requests headers from the sync peer and waits for its reply.
    async fn require_headers(
        &mut self,
        locator: Vec<Hash>,
        stop_hash: Hash,
    ) -> NetworkResult<Vec<BlockHeader>> {
        let peer = self.current_peer()?;
        if !peer.get_headers(&locator, stop_hash) {
            return Err(NetworkError::PeerDropped);
        }
        let deadline = Instant::now() + self.config.request_timeout;
        loop {
            let msg = match timeout_at(deadline, self.inbox.headers_rx.recv()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => return Err(NetworkError::PeerDropped),
                Err(_) => return Err(self.timeout_error("headers")),
            };
            if msg.peer_id != peer.id {
                debug!(peer = %msg.peer_id, "skipping headers from a non-sync peer");
                continue;
            }
            return Ok(msg.headers);
        }
    }

    /// Requests a merkle block from the sync peer and waits for its reply.
    async fn require_merkle_block(
        &mut self,
        height: u64,
        hash: Option<Hash>,
    ) -> NetworkResult<MerkleBlock> {
        let peer = self.current_peer()?;
        if !peer.get_merkle_block(height, hash) {
            return Err(NetworkError::PeerDropped);
        }
        let deadline = Instant::now() + self.config.request_timeout;
        loop {
            let msg = match timeout_at(deadline, self.inbox.merkle_rx.recv()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => return Err(NetworkError::PeerDropped),
                Err(_) => return Err(self.timeout_error("merkle block")),
            };
            if msg.peer_id != peer.id {
                debug!(peer = %msg.peer_id, "skipping merkle block from a non-sync peer");
                continue;
            }
            return Ok(msg.merkle_block);
        }
    }

    /// Requests one full block by height and waits for a reply at that
    /// height.
    pub async fn require_block(&mut self, height: u64) -> NetworkResult<Block> {
        let peer = self.current_peer()?;
        if !peer.get_block_by_height(height) {
            return Err(NetworkError::PeerDropped);
        }
        let deadline = Instant::now() + self.config.request_timeout;
        loop {
            let msg = match timeout_at(deadline, self.inbox.block_rx.recv()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => return Err(NetworkError::PeerDropped),
                Err(_) => return Err(self.timeout_error("block")),
            };
            if msg.peer_id != peer.id || msg.block.height() != height {
                debug!(peer = %msg.peer_id, "skipping non-matching block reply");
                continue;
            }
            return Ok(msg.block);
        }
    }

    /// Requests a batch of blocks after `locator` and waits for the reply.
    pub async fn require_blocks(
        &mut self,
        locator: Vec<Hash>,
        stop_hash: Hash,
    ) -> NetworkResult<Vec<Block>> {
        let peer = self.current_peer()?;
        if !peer.get_blocks(&locator, stop_hash) {
            return Err(NetworkError::PeerDropped);
        }
        let deadline = Instant::now() + self.config.request_timeout;
        loop {
            let msg = match timeout_at(deadline, self.inbox.blocks_rx.recv()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => return Err(NetworkError::PeerDropped),
                Err(_) => return Err(self.timeout_error("blocks")),
            };
            if msg.peer_id != peer.id {
                debug!(peer = %msg.peer_id, "skipping blocks from a non-sync peer");
                continue;
            }
            return Ok(msg.blocks);
        }
    }
}

/// Verifies both merkle commitments of a merkle block and decodes its
/// revealed statuses.
///
/// A merkle block revealing nothing proves nothing and carries an empty
/// status; it is accepted as-is.
pub fn verify_merkle_block(merkle_block: &MerkleBlock) -> NetworkResult<TransactionStatus> {
    if merkle_block.transactions.is_empty() {
        return Ok(TransactionStatus::default());
    }

    let related_ids: Vec<Hash> = merkle_block.transactions.iter().map(|tx| tx.id).collect();
    if !validate_tx_merkle_proof(
        &merkle_block.tx_hashes,
        &merkle_block.flags,
        &related_ids,
        &merkle_block.header.transactions_merkle_root,
    ) {
        return Err(NetworkError::ValidationFailed {
            reason: "transaction merkle proof does not commit to the revealed transactions".into(),
        });
    }

    let mut tx_status = TransactionStatus::default();
    for raw in &merkle_block.raw_statuses {
        let verdict: TxVerifyResult =
            serde_json::from_slice(raw).map_err(|err| NetworkError::ValidationFailed {
                reason: format!("undecodable transaction status: {err}"),
            })?;
        tx_status.verify_status.push(verdict);
    }
    if !validate_status_merkle_proof(
        &merkle_block.status_hashes,
        &merkle_block.flags,
        &tx_status.verify_status,
        &merkle_block.header.transaction_status_hash,
    ) {
        return Err(NetworkError::ValidationFailed {
            reason: "status merkle proof does not commit to the revealed statuses".into(),
        });
    }
    Ok(tx_status)
}

//! Peer transport contract and the inbound reply mailboxes.
//!
//! The engine correlates replies by `(peer_id, kind)`: each reply kind has
//! one bounded mailbox, and messages from peers other than the current sync
//! peer are skipped by the receiver. Backpressure on a noisy transport is
//! the mailbox capacity itself.

use std::sync::Arc;

use aurum_config::{
    BLOCKS_MAILBOX_CAPACITY, BLOCK_MAILBOX_CAPACITY, HEADERS_MAILBOX_CAPACITY,
    MERKLE_BLOCKS_MAILBOX_CAPACITY,
};
use aurum_core::{Block, BlockHeader, Hash, MerkleBlock};
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound request surface the core needs from a connected peer.
///
/// Every method reports whether the request left the machine; a `false`
/// means the peer is no longer usable. Replies come back asynchronously
/// through the [`SyncMailbox`].
pub trait PeerTransport: Send + Sync {
    /// Request one full block by height.
    fn get_block_by_height(&self, height: u64) -> bool;

    /// Request a merkle block by height, optionally pinned to a hash.
    fn get_merkle_block(&self, height: u64, hash: Option<Hash>) -> bool;

    /// Request headers after the locator, up to `stop_hash`.
    fn get_headers(&self, locator: &[Hash], stop_hash: Hash) -> bool;

    /// Request blocks after the locator, up to `stop_hash`.
    fn get_blocks(&self, locator: &[Hash], stop_hash: Hash) -> bool;

    /// Announce a new best block to the peer.
    fn announce_block(&self, block: &Block) -> bool;

    /// Announce the node's chain status (best header and genesis).
    fn announce_status(&self, best: &BlockHeader, genesis_hash: Hash) -> bool;

    /// Ask the peer to add a control program to its reveal filter.
    fn send_filter_add(&self, control_program: &[u8]) -> bool;
}

/// A single block pushed by a peer.
#[derive(Debug, Clone)]
pub struct BlockMsg {
    pub peer_id: String,
    pub block: Block,
}

/// A batch of blocks pushed by a peer.
#[derive(Debug, Clone)]
pub struct BlocksMsg {
    pub peer_id: String,
    pub blocks: Vec<Block>,
}

/// A batch of headers pushed by a peer.
#[derive(Debug, Clone)]
pub struct HeadersMsg {
    pub peer_id: String,
    pub headers: Vec<BlockHeader>,
}

/// A merkle block pushed by a peer.
#[derive(Debug, Clone)]
pub struct MerkleBlockMsg {
    pub peer_id: String,
    pub merkle_block: MerkleBlock,
}

/// Write half of the reply mailboxes, handed to the transport layer.
#[derive(Debug, Clone)]
pub struct SyncMailbox {
    block_tx: mpsc::Sender<BlockMsg>,
    blocks_tx: mpsc::Sender<BlocksMsg>,
    headers_tx: mpsc::Sender<HeadersMsg>,
    merkle_tx: mpsc::Sender<MerkleBlockMsg>,
}

impl SyncMailbox {
    pub async fn push_block(&self, peer_id: impl Into<String>, block: Block) {
        let msg = BlockMsg {
            peer_id: peer_id.into(),
            block,
        };
        if self.block_tx.send(msg).await.is_err() {
            debug!("block mailbox closed, dropping reply");
        }
    }

    pub async fn push_blocks(&self, peer_id: impl Into<String>, blocks: Vec<Block>) {
        let msg = BlocksMsg {
            peer_id: peer_id.into(),
            blocks,
        };
        if self.blocks_tx.send(msg).await.is_err() {
            debug!("blocks mailbox closed, dropping reply");
        }
    }

    pub async fn push_headers(&self, peer_id: impl Into<String>, headers: Vec<BlockHeader>) {
        let msg = HeadersMsg {
            peer_id: peer_id.into(),
            headers,
        };
        if self.headers_tx.send(msg).await.is_err() {
            debug!("headers mailbox closed, dropping reply");
        }
    }

    pub async fn push_merkle_block(&self, peer_id: impl Into<String>, merkle_block: MerkleBlock) {
        let msg = MerkleBlockMsg {
            peer_id: peer_id.into(),
            merkle_block,
        };
        if self.merkle_tx.send(msg).await.is_err() {
            debug!("merkle block mailbox closed, dropping reply");
        }
    }
}

/// Read half of the reply mailboxes, owned by the sync engine.
#[derive(Debug)]
pub struct SyncInbox {
    pub(crate) block_rx: mpsc::Receiver<BlockMsg>,
    pub(crate) blocks_rx: mpsc::Receiver<BlocksMsg>,
    pub(crate) headers_rx: mpsc::Receiver<HeadersMsg>,
    pub(crate) merkle_rx: mpsc::Receiver<MerkleBlockMsg>,
}

/// Creates the four bounded reply mailboxes with their default capacities.
pub fn sync_channels() -> (SyncMailbox, SyncInbox) {
    let (block_tx, block_rx) = mpsc::channel(BLOCK_MAILBOX_CAPACITY);
    let (blocks_tx, blocks_rx) = mpsc::channel(BLOCKS_MAILBOX_CAPACITY);
    let (headers_tx, headers_rx) = mpsc::channel(HEADERS_MAILBOX_CAPACITY);
    let (merkle_tx, merkle_rx) = mpsc::channel(MERKLE_BLOCKS_MAILBOX_CAPACITY);
    (
        SyncMailbox {
            block_tx,
            blocks_tx,
            headers_tx,
            merkle_tx,
        },
        SyncInbox {
            block_rx,
            blocks_rx,
            headers_rx,
            merkle_rx,
        },
    )
}

/// Convenience alias used by peer records.
pub type SharedTransport = Arc<dyn PeerTransport>;

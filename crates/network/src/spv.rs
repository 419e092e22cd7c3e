//! SPV address filter shared with the wallet.
//!
//! The wallet registers control programs it cares about; each registration
//! is broadcast to peers so they update their reveal filters, and kept
//! locally so this node can build filtered merkle blocks when serving its
//! own SPV clients.

use std::sync::Arc;

use aurum_core::{Block, CoreError, MerkleBlock, TransactionStatus};
use tokio::sync::Mutex;

use crate::peers::PeerSet;

/// Mutex-protected list of watched control programs.
pub struct AddressFilter {
    peers: Arc<PeerSet>,
    addresses: Mutex<Vec<Vec<u8>>>,
}

impl AddressFilter {
    pub fn new(peers: Arc<PeerSet>) -> Self {
        Self {
            peers,
            addresses: Mutex::new(Vec::new()),
        }
    }

    /// Registers a control program: broadcasts it to peers for their
    /// filters and appends it to the local watch list.
    pub async fn add_address(&self, control_program: Vec<u8>) {
        self.peers.broadcast_filter_add(&control_program).await;
        self.addresses.lock().await.push(control_program);
    }

    /// Snapshot of the watched control programs.
    pub async fn addresses(&self) -> Vec<Vec<u8>> {
        self.addresses.lock().await.clone()
    }

    /// Builds a merkle block revealing exactly the transactions whose
    /// payload references a watched control program.
    pub async fn filter_block(
        &self,
        block: &Block,
        tx_status: &TransactionStatus,
    ) -> Result<MerkleBlock, CoreError> {
        let watched = self.addresses.lock().await.clone();
        MerkleBlock::from_block(block, tx_status, |tx| {
            watched
                .iter()
                .any(|cp| !cp.is_empty() && contains_subslice(&tx.payload, cp))
        })
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len().max(1))
        .any(|window| window == needle)
}

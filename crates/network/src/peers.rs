//! Connected peer bookkeeping and selection.

use std::collections::HashMap;

use aurum_config::ServiceFlags;
use aurum_core::{Block, BlockHeader, Hash};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::NetworkError;
use crate::transport::SharedTransport;

#[derive(Clone)]
struct PeerState {
    services: ServiceFlags,
    tip_height: u64,
    healthy: bool,
    transport: SharedTransport,
}

/// Snapshot of the peer the engine is currently syncing from. Requests go
/// straight to the transport; replies come back through the mailboxes.
#[derive(Clone)]
pub struct SyncPeer {
    pub id: String,
    pub tip_height: u64,
    pub services: ServiceFlags,
    transport: SharedTransport,
}

impl SyncPeer {
    pub fn get_block_by_height(&self, height: u64) -> bool {
        self.transport.get_block_by_height(height)
    }

    pub fn get_merkle_block(&self, height: u64, hash: Option<Hash>) -> bool {
        self.transport.get_merkle_block(height, hash)
    }

    pub fn get_headers(&self, locator: &[Hash], stop_hash: Hash) -> bool {
        self.transport.get_headers(locator, stop_hash)
    }

    pub fn get_blocks(&self, locator: &[Hash], stop_hash: Hash) -> bool {
        self.transport.get_blocks(locator, stop_hash)
    }
}

/// The set of currently connected peers.
///
/// The peer manager (connection lifecycle, handshakes) lives outside the
/// core and feeds this set; the sync engine only reads it and reports
/// misbehaviour back through [`PeerSet::error_handler`].
#[derive(Default)]
pub struct PeerSet {
    peers: RwLock<HashMap<String, PeerState>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer after its handshake.
    pub async fn add_peer(
        &self,
        id: impl Into<String>,
        services: ServiceFlags,
        tip_height: u64,
        transport: SharedTransport,
    ) {
        let id = id.into();
        debug!(peer = %id, height = tip_height, services = services.0, "peer added");
        self.peers.write().await.insert(
            id,
            PeerState {
                services,
                tip_height,
                healthy: true,
                transport,
            },
        );
    }

    pub async fn remove_peer(&self, id: &str) {
        if self.peers.write().await.remove(id).is_some() {
            debug!(peer = %id, "peer removed");
        }
    }

    /// Updates the advertised tip after a status announcement.
    pub async fn set_peer_height(&self, id: &str, tip_height: u64) {
        if let Some(peer) = self.peers.write().await.get_mut(id) {
            peer.tip_height = tip_height;
        }
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_healthy(&self, id: &str) -> bool {
        self.peers
            .read()
            .await
            .get(id)
            .map(|peer| peer.healthy)
            .unwrap_or(false)
    }

    /// The healthy peer with the greatest advertised tip whose services
    /// cover `required`.
    pub async fn best_peer(&self, required: ServiceFlags) -> Option<SyncPeer> {
        let peers = self.peers.read().await;
        peers
            .iter()
            .filter(|(_, state)| state.healthy && state.services.contains(required))
            .max_by_key(|(_, state)| state.tip_height)
            .map(|(id, state)| SyncPeer {
                id: id.clone(),
                tip_height: state.tip_height,
                services: state.services,
                transport: state.transport.clone(),
            })
    }

    /// Reports a peer-attributable sync failure: the peer is marked
    /// unhealthy and skipped by [`PeerSet::best_peer`] until the peer
    /// manager reconnects it.
    pub async fn error_handler(&self, peer_id: &str, err: &NetworkError) {
        warn!(peer = %peer_id, err = %err, "marking peer as misbehaving");
        if let Some(peer) = self.peers.write().await.get_mut(peer_id) {
            peer.healthy = false;
        }
    }

    /// Announces a freshly connected block to every healthy peer.
    pub async fn broadcast_mined_block(&self, block: &Block) {
        let peers = self.peers.read().await;
        for (id, state) in peers.iter() {
            if state.healthy && !state.transport.announce_block(block) {
                debug!(peer = %id, "failed to announce block");
            }
        }
    }

    /// Announces the node's chain status to every healthy peer.
    pub async fn broadcast_new_status(&self, best: &BlockHeader, genesis_hash: Hash) {
        let peers = self.peers.read().await;
        for (id, state) in peers.iter() {
            if state.healthy && !state.transport.announce_status(best, genesis_hash) {
                debug!(peer = %id, "failed to announce status");
            }
        }
    }

    /// Pushes a filter address to every healthy peer.
    pub async fn broadcast_filter_add(&self, control_program: &[u8]) {
        let peers = self.peers.read().await;
        for (id, state) in peers.iter() {
            if state.healthy && !state.transport.send_filter_add(control_program) {
                debug!(peer = %id, "failed to send filter address");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct NullTransport;

    impl crate::transport::PeerTransport for NullTransport {
        fn get_block_by_height(&self, _height: u64) -> bool {
            true
        }
        fn get_merkle_block(&self, _height: u64, _hash: Option<Hash>) -> bool {
            true
        }
        fn get_headers(&self, _locator: &[Hash], _stop_hash: Hash) -> bool {
            true
        }
        fn get_blocks(&self, _locator: &[Hash], _stop_hash: Hash) -> bool {
            true
        }
        fn announce_block(&self, _block: &Block) -> bool {
            true
        }
        fn announce_status(&self, _best: &BlockHeader, _genesis_hash: Hash) -> bool {
            true
        }
        fn send_filter_add(&self, _control_program: &[u8]) -> bool {
            true
        }
    }

    fn transport() -> SharedTransport {
        Arc::new(NullTransport)
    }

    #[tokio::test]
    async fn best_peer_requires_a_flag_superset() {
        let peers = PeerSet::new();
        peers
            .add_peer("full", ServiceFlags::FULL_NODE, 500, transport())
            .await;
        peers
            .add_peer(
                "fast",
                ServiceFlags::FULL_NODE | ServiceFlags::FAST_SYNC,
                100,
                transport(),
            )
            .await;

        let best = peers
            .best_peer(ServiceFlags::FULL_NODE)
            .await
            .expect("full node available");
        assert_eq!(best.id, "full", "greatest tip wins among qualified peers");

        let best = peers
            .best_peer(ServiceFlags::FULL_NODE | ServiceFlags::FAST_SYNC)
            .await
            .expect("fast sync node available");
        assert_eq!(best.id, "fast");

        assert!(peers.best_peer(ServiceFlags::SPV_PROOF).await.is_none());
    }

    #[tokio::test]
    async fn error_handler_sidelines_a_peer() {
        let peers = PeerSet::new();
        peers
            .add_peer("only", ServiceFlags::FULL_NODE, 10, transport())
            .await;
        assert!(peers.best_peer(ServiceFlags::FULL_NODE).await.is_some());

        peers
            .error_handler(
                "only",
                &NetworkError::PeerMisbehave {
                    reason: "test".into(),
                },
            )
            .await;
        assert!(!peers.is_healthy("only").await);
        assert!(peers.best_peer(ServiceFlags::FULL_NODE).await.is_none());
    }

    #[tokio::test]
    async fn height_updates_change_selection() {
        let peers = PeerSet::new();
        peers
            .add_peer("a", ServiceFlags::FULL_NODE, 10, transport())
            .await;
        peers
            .add_peer("b", ServiceFlags::FULL_NODE, 20, transport())
            .await;
        peers.set_peer_height("a", 30).await;
        let best = peers
            .best_peer(ServiceFlags::FULL_NODE)
            .await
            .expect("peer available");
        assert_eq!(best.id, "a");
        assert_eq!(best.tip_height, 30);
    }
}

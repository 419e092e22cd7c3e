//! Block synchronization for the Aurum node.
//!
//! The network crate owns the peer-facing half of the sync core: the peer
//! set with its service-flag-aware best-peer selection, the four bounded
//! mailboxes that carry peer replies into the engine, the header working
//! list used during checkpoint-bounded fast sync, and the [`SyncEngine`]
//! that drives both sync modes on a periodic cycle.
//!
//! Transport framing, peer discovery and handshakes live outside this
//! crate; peers arrive here as a [`PeerTransport`] implementation plus the
//! service flags and tip height they advertised.

pub mod error;
pub mod header_list;
pub mod peers;
pub mod spv;
pub mod sync;
pub mod transport;

pub use error::{NetworkError, NetworkResult};
pub use header_list::HeaderList;
pub use peers::{PeerSet, SyncPeer};
pub use spv::AddressFilter;
pub use sync::{verify_merkle_block, SyncConfig, SyncEngine, SyncHandle};
pub use transport::{
    sync_channels, BlockMsg, BlocksMsg, HeadersMsg, MerkleBlockMsg, PeerTransport, SyncMailbox,
};

//! Configuration for the Aurum node core.
//!
//! This crate provides:
//! - Network identity (`NetworkType`) and per-network chain parameters
//!   (genesis header, compiled-in checkpoints)
//! - Service flags advertised by peers on the wire
//! - Protocol defaults shared by the sync engine and its collaborators
//!
//! Parameters are plain values threaded through construction; there is no
//! process-global configuration.

mod limits;
mod network;
mod params;
mod service_flags;

pub use limits::{
    BLOCKS_MAILBOX_CAPACITY, BLOCK_LOCATOR_DENSE_PREFIX, BLOCK_MAILBOX_CAPACITY,
    HEADERS_MAILBOX_CAPACITY, MAX_BLOCKS_PER_MSG, MAX_BLOCK_HEADERS_PER_MSG,
    MERKLE_BLOCKS_MAILBOX_CAPACITY, SYNC_CYCLE, SYNC_TIMEOUT,
};
pub use network::NetworkType;
pub use params::{Checkpoint, NetworkParams};
pub use service_flags::ServiceFlags;

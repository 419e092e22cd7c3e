//! Chain state for the Aurum node.
//!
//! The ledger owns the local view of the chain: an in-memory index of every
//! known header, a pool of blocks whose parents have not arrived yet, a
//! storage trait behind which blocks and chain status persist, and the
//! [`Chain`] state machine that serialises all block ingestion through a
//! single writer.
//!
//! Everything peer-facing (request scheduling, proof verification, peer
//! scoring) lives in the network crate; by the time a block reaches
//! [`Chain::process_block`] it is either structurally valid or gets rejected
//! on header rules alone.

pub mod block_index;
pub mod chain;
pub mod error;
pub mod orphan_pool;
pub mod store;
mod validation;

pub use block_index::{BlockIndex, BlockNode, NodeHandle};
pub use chain::{calc_reorganize_nodes, Chain};
pub use error::{LedgerError, LedgerResult};
pub use orphan_pool::{OrphanBlock, OrphanPool};
pub use store::{MemoryStore, Store, StoreStatus};

//! Error types for the ledger crate.

use aurum_core::Hash;
use thiserror::Error;

/// Result alias used throughout the ledger crate.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Errors produced by the chain state machine and its collaborators.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The storage backend failed. Indexes stay untouched when this is
    /// returned: state only advances after successful persistence.
    #[error("storage failure during {operation}: {reason}")]
    Storage { operation: String, reason: String },

    /// A block referenced a parent the index does not know.
    #[error("unknown parent {parent} for block {hash}")]
    UnknownParent { hash: Hash, parent: Hash },

    /// A block's height does not follow its parent's.
    #[error("block {hash} at height {height} does not follow parent height {parent_height}")]
    HeightMismatch {
        hash: Hash,
        height: u64,
        parent_height: u64,
    },

    /// The same block was offered to the index twice.
    #[error("block {hash} is already indexed")]
    DuplicateBlock { hash: Hash },

    /// A header failed contextual validation against its parent chain.
    #[error("invalid header {hash}: {reason}")]
    InvalidHeader { hash: Hash, reason: String },

    /// The chain's internal structures disagree with each other. Fatal for
    /// the ingestion pipeline.
    #[error("chain state inconsistency: {reason}")]
    Inconsistency { reason: String },

    /// A lookup for a block that should exist came back empty.
    #[error("block {hash} not found")]
    BlockNotFound { hash: Hash },

    /// The block-processor worker is gone.
    #[error("chain worker unavailable")]
    WorkerClosed,
}

impl LedgerError {
    /// Whether the error is attributable to bad data from a peer, as
    /// opposed to a local storage or consistency failure.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            LedgerError::UnknownParent { .. }
                | LedgerError::HeightMismatch { .. }
                | LedgerError::InvalidHeader { .. }
        )
    }
}

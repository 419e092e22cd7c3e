//! Error types for the core primitives.

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors produced by the primitive types and the merkle proof machinery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A byte slice of the wrong length was offered as a hash.
    #[error("invalid hash length: {len} bytes, expected {expected}")]
    InvalidHashLength { len: usize, expected: usize },

    /// A hex string could not be decoded into a hash.
    #[error("invalid hash hex: {reason}")]
    InvalidHashHex { reason: String },

    /// A merkle proof is structurally broken: bad flag stream, exhausted or
    /// unconsumed inputs, or a revealed leaf that does not match its hash.
    #[error("invalid merkle proof: {reason}")]
    InvalidMerkleProof { reason: &'static str },

    /// A structurally sound proof reconstructed a different root than the
    /// one committed in the header.
    #[error("computed merkle root does not match the committed root")]
    RootMismatch,

    /// The number of verify statuses does not match the number of
    /// transactions they are supposed to describe.
    #[error("status count {statuses} does not match transaction count {transactions}")]
    StatusCountMismatch { statuses: usize, transactions: usize },

    /// A per-transaction verify status could not be encoded.
    #[error("failed to encode transaction status: {reason}")]
    StatusEncoding { reason: String },
}

//! Primitive types of the Aurum chain.
//!
//! This crate carries everything the rest of the node agrees on by value:
//! hashes, block headers, transactions, partial (SPV) blocks, the merkle
//! commitments a header makes over its contents, and the compact-bits
//! proof-of-work rules used to weigh branches against each other.
//!
//! Nothing in here performs I/O; every function is deterministic over its
//! inputs so the ledger and network layers can call in from any task.

pub mod difficulty;
pub mod error;
pub mod merkle;
pub mod pow_cache;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use merkle::{
    build_merkle_proof, build_status_proof, status_merkle_root, tx_merkle_root,
    validate_status_merkle_proof, validate_tx_merkle_proof, verify_status_inclusion,
    verify_tx_inclusion,
};
pub use pow_cache::PowCache;
pub use types::{
    Block, BlockHeader, Hash, MerkleBlock, Transaction, TransactionStatus, TxVerifyResult,
};

//! Block header and its deterministic content hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Hash;

/// Header of a block.
///
/// The header commits to the block body twice: `transactions_merkle_root`
/// over the transaction ids and `transaction_status_hash` over the ordered
/// per-transaction verify results. Both commitments are what SPV peers prove
/// inclusion against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block version.
    pub version: u64,
    /// Height of the block in the chain, genesis is 0.
    pub height: u64,
    /// Hash of the header at `height - 1`.
    pub previous_block_hash: Hash,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Miner nonce.
    pub nonce: u64,
    /// Compact-bits encoding of the proof-of-work target.
    pub bits: u64,
    /// Merkle root over the ids of the block's transactions.
    pub transactions_merkle_root: Hash,
    /// Merkle root over the ordered per-transaction verify statuses.
    pub transaction_status_hash: Hash,
}

impl BlockHeader {
    /// Deterministic hash of the header over all of its fields.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(8 * 5 + Hash::LENGTH * 3);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(self.previous_block_hash.as_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.bits.to_le_bytes());
        buf.extend_from_slice(self.transactions_merkle_root.as_bytes());
        buf.extend_from_slice(self.transaction_status_hash.as_bytes());
        Hash::new(Sha256::digest(&buf).into())
    }
}

//! Full blocks and opaque transactions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{BlockHeader, Hash};

/// An opaque transaction with a stable content id.
///
/// The sync core never interprets the payload; consensus-level transaction
/// validation happens elsewhere. The id is all the merkle machinery needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable content identifier.
    pub id: Hash,
    /// Serialized transaction body.
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Builds a transaction whose id is derived from the payload.
    pub fn new(payload: Vec<u8>) -> Self {
        let id = Hash::new(Sha256::digest(&payload).into());
        Self { id, payload }
    }
}

/// A block as the light node sees it: a header plus the transactions it
/// knows about.
///
/// For blocks promoted from a merkle block this is a view, not the complete
/// block; see [`MerkleBlock::to_block`](super::MerkleBlock::to_block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Hash of the block, which is the hash of its header.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Height shortcut.
    pub fn height(&self) -> u64 {
        self.header.height
    }
}

//! Partial blocks served to SPV clients.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::merkle::{build_merkle_proof, build_status_proof};
use crate::types::{Block, BlockHeader, Hash, Transaction, TransactionStatus};

/// A block stripped down to a header, a revealed subset of transactions and
/// the merkle paths proving that subset against the header's commitments.
///
/// `tx_hashes` and `flags` encode the transaction-tree path; `status_hashes`
/// reuses the same `flags` over the status tree, whose shape is identical.
/// `raw_statuses` carries the revealed verify results as their canonical
/// JSON encoding, one entry per revealed transaction, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBlock {
    pub header: BlockHeader,
    pub tx_hashes: Vec<Hash>,
    pub transactions: Vec<Transaction>,
    pub flags: Vec<u8>,
    pub status_hashes: Vec<Hash>,
    pub raw_statuses: Vec<Vec<u8>>,
}

impl MerkleBlock {
    /// Hash of the underlying block.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Assembles a merkle block from a full block, revealing the
    /// transactions selected by `reveal`.
    ///
    /// `status` must carry one verify result per transaction of the block.
    pub fn from_block(
        block: &Block,
        status: &TransactionStatus,
        reveal: impl Fn(&Transaction) -> bool,
    ) -> Result<Self, CoreError> {
        if status.len() != block.transactions.len() {
            return Err(CoreError::StatusCountMismatch {
                statuses: status.len(),
                transactions: block.transactions.len(),
            });
        }

        let ids: Vec<Hash> = block.transactions.iter().map(|tx| tx.id).collect();
        let mask: Vec<bool> = block.transactions.iter().map(|tx| reveal(tx)).collect();

        let (tx_hashes, flags) = build_merkle_proof(&ids, &mask);
        let (status_hashes, status_flags) = build_status_proof(&status.verify_status, &mask)?;
        debug_assert_eq!(flags, status_flags);

        let mut transactions = Vec::new();
        let mut raw_statuses = Vec::new();
        for (i, tx) in block.transactions.iter().enumerate() {
            if !mask[i] {
                continue;
            }
            transactions.push(tx.clone());
            let raw = serde_json::to_vec(&status.verify_status[i]).map_err(|e| {
                CoreError::StatusEncoding {
                    reason: e.to_string(),
                }
            })?;
            raw_statuses.push(raw);
        }

        Ok(Self {
            header: block.header.clone(),
            tx_hashes,
            transactions,
            flags,
            status_hashes,
            raw_statuses,
        })
    }

    /// Promotes the merkle block to a [`Block`].
    ///
    /// The promotion is lossy: the result contains only the revealed
    /// transactions, so it is a view of the original block, not something
    /// that can be re-serialized into it.
    pub fn to_block(&self) -> Block {
        Block {
            header: self.header.clone(),
            transactions: self.transactions.clone(),
        }
    }
}

//! Ordered per-transaction verify results committed into the header.

use serde::{Deserialize, Serialize};

/// Verify verdict for a single transaction.
///
/// `status_fail` marks a gas-only transaction: it paid for execution but its
/// effects were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxVerifyResult {
    pub status_fail: bool,
}

/// The ordered sequence of verify results for a block, position i describing
/// transaction i. The sequence is committed into
/// `BlockHeader::transaction_status_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub verify_status: Vec<TxVerifyResult>,
}

impl TransactionStatus {
    /// Records the verdict for the transaction at `index`, growing the
    /// sequence as needed.
    pub fn set_status(&mut self, index: usize, status_fail: bool) {
        if index >= self.verify_status.len() {
            self.verify_status
                .resize(index + 1, TxVerifyResult::default());
        }
        self.verify_status[index] = TxVerifyResult { status_fail };
    }

    /// Verdict for the transaction at `index`, if recorded.
    pub fn status(&self, index: usize) -> Option<TxVerifyResult> {
        self.verify_status.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.verify_status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verify_status.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_status_grows_and_overwrites() {
        let mut status = TransactionStatus::default();
        status.set_status(2, true);
        assert_eq!(status.len(), 3);
        assert_eq!(status.status(0), Some(TxVerifyResult { status_fail: false }));
        assert_eq!(status.status(2), Some(TxVerifyResult { status_fail: true }));

        status.set_status(2, false);
        assert_eq!(status.status(2), Some(TxVerifyResult { status_fail: false }));
        assert_eq!(status.status(5), None);
    }
}

//! Ordered working set of headers during fast sync.
//!
//! Rebuilt at the start of every fast-sync attempt, anchored at the local
//! best header, and discarded when the attempt finishes or the peer fails.
//! The list only ever grows at the back and every appended header must
//! chain onto the previous one.

use aurum_core::BlockHeader;
use std::collections::VecDeque;

use crate::error::{NetworkError, NetworkResult};

/// The fast-sync header working list.
#[derive(Debug, Default)]
pub struct HeaderList {
    headers: VecDeque<BlockHeader>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the list and re-anchors it at `anchor`, or leaves it empty
    /// when there is no checkpoint left to sync towards.
    pub fn reset_from(&mut self, anchor: Option<BlockHeader>) {
        self.headers.clear();
        if let Some(header) = anchor {
            self.headers.push_back(header);
        }
    }

    /// Appends a batch of headers, each chaining onto its predecessor.
    ///
    /// On any order mismatch the list is left unchanged.
    pub fn append(&mut self, headers: Vec<BlockHeader>) -> NetworkResult<()> {
        let mut prev_hash = match self.headers.back() {
            Some(header) => header.hash(),
            None => return Err(NetworkError::AppendOrderMismatch),
        };
        for header in &headers {
            if header.previous_block_hash != prev_hash {
                return Err(NetworkError::AppendOrderMismatch);
            }
            prev_hash = header.hash();
        }
        self.headers.extend(headers);
        Ok(())
    }

    pub fn front(&self) -> Option<&BlockHeader> {
        self.headers.front()
    }

    pub fn back(&self) -> Option<&BlockHeader> {
        self.headers.back()
    }

    /// Header at position `index`, the anchor being position 0.
    pub fn get(&self, index: usize) -> Option<&BlockHeader> {
        self.headers.get(index)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

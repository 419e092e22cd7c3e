//! Cache of already-verified proof-of-work results.
//!
//! Fast sync verifies block bodies against checkpoint-bounded headers, so it
//! can stamp a block as verified before handing it to the chain and lift the
//! stamp once ingestion finishes. The cache is keyed by `(block_hash, seed)`
//! because a block's proof is only meaningful under its epoch seed.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::types::Hash;

/// Set of `(block_hash, seed)` pairs whose proof-of-work has already been
/// verified. Threaded through construction as an explicit context value.
#[derive(Debug, Default)]
pub struct PowCache {
    verified: Mutex<HashSet<(Hash, Hash)>>,
}

impl PowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the pair as verified.
    pub fn insert(&self, block_hash: Hash, seed: Hash) {
        if let Ok(mut verified) = self.verified.lock() {
            verified.insert((block_hash, seed));
        }
    }

    /// Lifts a previous stamp, if any.
    pub fn remove(&self, block_hash: &Hash, seed: &Hash) {
        if let Ok(mut verified) = self.verified.lock() {
            verified.remove(&(*block_hash, *seed));
        }
    }

    /// Whether the pair has been stamped as verified.
    pub fn contains(&self, block_hash: &Hash, seed: &Hash) -> bool {
        self.verified
            .lock()
            .map(|verified| verified.contains(&(*block_hash, *seed)))
            .unwrap_or(false)
    }
}

//! Merkle commitments over block contents and flag-driven inclusion proofs.
//!
//! A block header commits to its transactions and to their verify statuses
//! through two merkle roots of identical shape (one leaf per transaction).
//! A peer proving inclusion of a subset sends interior hashes plus a flag
//! stream describing a pre-order walk of the tree:
//!
//! * `FLAG_ASSIST` - consume one hash as an opaque subtree root;
//! * `FLAG_LEAF` - consume one hash and one revealed leaf, which must agree;
//! * `FLAG_PARENT` - descend into the left child, then the right child.
//!
//! Validation recomputes the root from the proof and insists that every
//! supplied hash, flag and revealed leaf is consumed exactly once. A proof
//! that smuggles in an extra interior hash, or reveals leaves out of order,
//! is rejected even if some prefix of it would reconstruct the right root.

use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::types::{Hash, TxVerifyResult};

/// Consume one hash as a pruned subtree root.
pub const FLAG_ASSIST: u8 = 0;
/// Consume one hash and match it against the next revealed leaf.
pub const FLAG_LEAF: u8 = 1;
/// Descend into both children.
pub const FLAG_PARENT: u8 = 2;

/// Hard cap on proof recursion. A tree over 2^64 leaves is at most 64 levels
/// deep, so anything beyond this is an attack on the stack, not a proof.
const MAX_PROOF_DEPTH: usize = 64;

const LEAF_DOMAIN: u8 = 0x00;
const INTERIOR_DOMAIN: u8 = 0x01;

fn leaf_hash(id: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_DOMAIN]);
    hasher.update(id.as_bytes());
    Hash::new(hasher.finalize().into())
}

fn interior_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([INTERIOR_DOMAIN]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash::new(hasher.finalize().into())
}

/// Content id of a verify status leaf: the hash of its canonical encoding.
fn status_leaf_id(status: &TxVerifyResult) -> Result<Hash, CoreError> {
    let bytes = serde_json::to_vec(status).map_err(|e| CoreError::StatusEncoding {
        reason: e.to_string(),
    })?;
    Ok(Hash::new(Sha256::digest(&bytes).into()))
}

/// Split point of a node covering `n > 1` leaves: the largest power of two
/// strictly below `n`. This fixes the tree shape shared by roots, proofs and
/// validation.
fn split_point(n: usize) -> usize {
    let mut point = 1;
    while point * 2 < n {
        point *= 2;
    }
    point
}

fn subtree_root(ids: &[Hash]) -> Hash {
    match ids.len() {
        1 => leaf_hash(&ids[0]),
        n => {
            let mid = split_point(n);
            interior_hash(&subtree_root(&ids[..mid]), &subtree_root(&ids[mid..]))
        }
    }
}

/// Merkle root over transaction ids. The empty block commits to the zero
/// hash.
pub fn tx_merkle_root(ids: &[Hash]) -> Hash {
    if ids.is_empty() {
        return Hash::ZERO;
    }
    subtree_root(ids)
}

/// Merkle root over the ordered per-transaction verify statuses.
pub fn status_merkle_root(statuses: &[TxVerifyResult]) -> Result<Hash, CoreError> {
    let ids = statuses
        .iter()
        .map(status_leaf_id)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tx_merkle_root(&ids))
}

/// Builds the `(hashes, flags)` proof revealing exactly the leaves marked in
/// `reveal`. The flag stream depends only on the leaf count and the reveal
/// positions, so the transaction tree and the status tree of the same block
/// share one stream.
pub fn build_merkle_proof(ids: &[Hash], reveal: &[bool]) -> (Vec<Hash>, Vec<u8>) {
    let mut hashes = Vec::new();
    let mut flags = Vec::new();
    if !ids.is_empty() && ids.len() == reveal.len() {
        build_proof_node(ids, reveal, &mut hashes, &mut flags);
    }
    (hashes, flags)
}

fn build_proof_node(ids: &[Hash], reveal: &[bool], hashes: &mut Vec<Hash>, flags: &mut Vec<u8>) {
    if ids.len() == 1 {
        flags.push(if reveal[0] { FLAG_LEAF } else { FLAG_ASSIST });
        hashes.push(leaf_hash(&ids[0]));
        return;
    }
    if !reveal.iter().any(|r| *r) {
        flags.push(FLAG_ASSIST);
        hashes.push(subtree_root(ids));
        return;
    }
    flags.push(FLAG_PARENT);
    let mid = split_point(ids.len());
    build_proof_node(&ids[..mid], &reveal[..mid], hashes, flags);
    build_proof_node(&ids[mid..], &reveal[mid..], hashes, flags);
}

/// Builds the status-tree counterpart of [`build_merkle_proof`]. The flag
/// stream it produces is identical to the transaction tree's for the same
/// reveal positions.
pub fn build_status_proof(
    statuses: &[TxVerifyResult],
    reveal: &[bool],
) -> Result<(Vec<Hash>, Vec<u8>), CoreError> {
    let ids = statuses
        .iter()
        .map(status_leaf_id)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(build_merkle_proof(&ids, reveal))
}

struct ProofCursor<'a> {
    hashes: &'a [Hash],
    flags: &'a [u8],
    related: &'a [Hash],
    next_hash: usize,
    next_flag: usize,
    next_related: usize,
}

impl ProofCursor<'_> {
    fn take_flag(&mut self) -> Result<u8, CoreError> {
        let flag = self
            .flags
            .get(self.next_flag)
            .copied()
            .ok_or(CoreError::InvalidMerkleProof {
                reason: "flag stream exhausted",
            })?;
        self.next_flag += 1;
        Ok(flag)
    }

    fn take_hash(&mut self) -> Result<Hash, CoreError> {
        let hash = self
            .hashes
            .get(self.next_hash)
            .copied()
            .ok_or(CoreError::InvalidMerkleProof {
                reason: "hash list exhausted",
            })?;
        self.next_hash += 1;
        Ok(hash)
    }

    fn take_related(&mut self) -> Result<Hash, CoreError> {
        let id = self
            .related
            .get(self.next_related)
            .copied()
            .ok_or(CoreError::InvalidMerkleProof {
                reason: "revealed leaf list exhausted",
            })?;
        self.next_related += 1;
        Ok(id)
    }

    fn fully_consumed(&self) -> bool {
        self.next_hash == self.hashes.len()
            && self.next_flag == self.flags.len()
            && self.next_related == self.related.len()
    }
}

fn walk_proof(cursor: &mut ProofCursor<'_>, depth: usize) -> Result<Hash, CoreError> {
    if depth > MAX_PROOF_DEPTH {
        return Err(CoreError::InvalidMerkleProof {
            reason: "proof nesting exceeds maximum depth",
        });
    }
    match cursor.take_flag()? {
        FLAG_ASSIST => cursor.take_hash(),
        FLAG_LEAF => {
            let supplied = cursor.take_hash()?;
            let revealed = cursor.take_related()?;
            if supplied != leaf_hash(&revealed) {
                return Err(CoreError::InvalidMerkleProof {
                    reason: "revealed leaf does not match its proof hash",
                });
            }
            Ok(supplied)
        }
        FLAG_PARENT => {
            let left = walk_proof(cursor, depth + 1)?;
            let right = walk_proof(cursor, depth + 1)?;
            Ok(interior_hash(&left, &right))
        }
        _ => Err(CoreError::InvalidMerkleProof {
            reason: "unknown proof flag",
        }),
    }
}

/// Recomputes the root committed by a proof, enforcing exact consumption of
/// hashes, flags and revealed leaves.
pub fn compute_proof_root(
    hashes: &[Hash],
    flags: &[u8],
    related: &[Hash],
) -> Result<Hash, CoreError> {
    let mut cursor = ProofCursor {
        hashes,
        flags,
        related,
        next_hash: 0,
        next_flag: 0,
        next_related: 0,
    };
    let root = walk_proof(&mut cursor, 0)?;
    if !cursor.fully_consumed() {
        return Err(CoreError::InvalidMerkleProof {
            reason: "unconsumed proof input",
        });
    }
    Ok(root)
}

/// Verifies that `related_ids` (in order) are committed by `expected_root`
/// through the supplied proof, distinguishing structural breakage from a
/// root disagreement.
pub fn verify_tx_inclusion(
    hashes: &[Hash],
    flags: &[u8],
    related_ids: &[Hash],
    expected_root: &Hash,
) -> Result<(), CoreError> {
    let root = compute_proof_root(hashes, flags, related_ids)?;
    if root != *expected_root {
        return Err(CoreError::RootMismatch);
    }
    Ok(())
}

/// Status-tree counterpart of [`verify_tx_inclusion`].
pub fn verify_status_inclusion(
    hashes: &[Hash],
    flags: &[u8],
    related: &[TxVerifyResult],
    expected_root: &Hash,
) -> Result<(), CoreError> {
    let ids = related
        .iter()
        .map(status_leaf_id)
        .collect::<Result<Vec<_>, _>>()?;
    verify_tx_inclusion(hashes, flags, &ids, expected_root)
}

/// Boolean form of [`verify_tx_inclusion`].
pub fn validate_tx_merkle_proof(
    hashes: &[Hash],
    flags: &[u8],
    related_ids: &[Hash],
    expected_root: &Hash,
) -> bool {
    verify_tx_inclusion(hashes, flags, related_ids, expected_root).is_ok()
}

/// Boolean form of [`verify_status_inclusion`].
pub fn validate_status_merkle_proof(
    hashes: &[Hash],
    flags: &[u8],
    related: &[TxVerifyResult],
    expected_root: &Hash,
) -> bool {
    verify_status_inclusion(hashes, flags, related, expected_root).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Hash> {
        (0..n)
            .map(|i| {
                let mut bytes = [0u8; 32];
                bytes[0] = i as u8;
                bytes[1] = 0xaa;
                Hash::new(bytes)
            })
            .collect()
    }

    fn reveal_mask(n: usize, revealed: &[usize]) -> Vec<bool> {
        let mut mask = vec![false; n];
        for &i in revealed {
            mask[i] = true;
        }
        mask
    }

    #[test]
    fn single_leaf_root() {
        let leaves = ids(1);
        assert_eq!(tx_merkle_root(&leaves), leaf_hash(&leaves[0]));
    }

    #[test]
    fn empty_root_is_zero() {
        assert_eq!(tx_merkle_root(&[]), Hash::ZERO);
    }

    #[test]
    fn proof_round_trip_over_subsets() {
        for n in 1..=9usize {
            let leaves = ids(n);
            let root = tx_merkle_root(&leaves);
            // Every singleton, plus a couple of wider subsets.
            let mut subsets: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
            subsets.push((0..n).collect());
            if n > 2 {
                subsets.push(vec![0, n - 1]);
            }
            for subset in subsets {
                let mask = reveal_mask(n, &subset);
                let (hashes, flags) = build_merkle_proof(&leaves, &mask);
                let related: Vec<Hash> = subset.iter().map(|&i| leaves[i]).collect();
                assert!(
                    validate_tx_merkle_proof(&hashes, &flags, &related, &root),
                    "n={n} subset={subset:?}"
                );
            }
        }
    }

    #[test]
    fn empty_reveal_still_validates() {
        let leaves = ids(6);
        let root = tx_merkle_root(&leaves);
        let (hashes, flags) = build_merkle_proof(&leaves, &vec![false; 6]);
        assert_eq!(hashes.len(), 1);
        assert!(validate_tx_merkle_proof(&hashes, &flags, &[], &root));
    }

    #[test]
    fn flipped_flag_is_rejected() {
        let leaves = ids(8);
        let root = tx_merkle_root(&leaves);
        let mask = reveal_mask(8, &[3]);
        let (hashes, flags) = build_merkle_proof(&leaves, &mask);
        let related = vec![leaves[3]];
        for i in 0..flags.len() {
            let mut mutated = flags.clone();
            mutated[i] = (mutated[i] + 1) % 3;
            assert!(
                !validate_tx_merkle_proof(&hashes, &mutated, &related, &root),
                "flag {i} flip accepted"
            );
        }
    }

    #[test]
    fn flipped_hash_is_rejected() {
        let leaves = ids(8);
        let root = tx_merkle_root(&leaves);
        let mask = reveal_mask(8, &[5]);
        let (hashes, flags) = build_merkle_proof(&leaves, &mask);
        let related = vec![leaves[5]];
        for i in 0..hashes.len() {
            let mut mutated = hashes.clone();
            let mut bytes = mutated[i].to_array();
            bytes[0] ^= 0x01;
            mutated[i] = Hash::new(bytes);
            assert!(
                !validate_tx_merkle_proof(&mutated, &flags, &related, &root),
                "hash {i} flip accepted"
            );
        }
    }

    #[test]
    fn duplicated_interior_hash_is_rejected() {
        let leaves = ids(8);
        let root = tx_merkle_root(&leaves);
        let mask = reveal_mask(8, &[2]);
        let (mut hashes, flags) = build_merkle_proof(&leaves, &mask);
        // An extra copy of an interior hash must be left unconsumed, which
        // fails the proof even though the walk itself would succeed.
        hashes.push(hashes[0]);
        let related = vec![leaves[2]];
        assert!(!validate_tx_merkle_proof(&hashes, &flags, &related, &root));
    }

    #[test]
    fn reordered_reveals_are_rejected() {
        let leaves = ids(8);
        let root = tx_merkle_root(&leaves);
        let mask = reveal_mask(8, &[1, 6]);
        let (hashes, flags) = build_merkle_proof(&leaves, &mask);
        let related = vec![leaves[6], leaves[1]];
        assert!(!validate_tx_merkle_proof(&hashes, &flags, &related, &root));
    }

    #[test]
    fn missing_reveal_is_rejected() {
        let leaves = ids(4);
        let root = tx_merkle_root(&leaves);
        let mask = reveal_mask(4, &[0, 2]);
        let (hashes, flags) = build_merkle_proof(&leaves, &mask);
        let related = vec![leaves[0]];
        assert!(!validate_tx_merkle_proof(&hashes, &flags, &related, &root));
    }

    #[test]
    fn deeply_nested_flags_are_rejected() {
        let flags = vec![FLAG_PARENT; 100];
        assert!(matches!(
            compute_proof_root(&[], &flags, &[]),
            Err(CoreError::InvalidMerkleProof { .. })
        ));
    }

    #[test]
    fn root_mismatch_is_distinguished_from_structural_failure() {
        let leaves = ids(4);
        let mask = reveal_mask(4, &[1]);
        let (hashes, flags) = build_merkle_proof(&leaves, &mask);
        let related = vec![leaves[1]];

        let wrong_root = Hash::new([0xee; 32]);
        assert_eq!(
            verify_tx_inclusion(&hashes, &flags, &related, &wrong_root),
            Err(CoreError::RootMismatch)
        );

        let mut truncated = hashes.clone();
        truncated.pop();
        assert!(matches!(
            verify_tx_inclusion(&truncated, &flags, &related, &tx_merkle_root(&leaves)),
            Err(CoreError::InvalidMerkleProof { .. })
        ));
    }

    #[test]
    fn status_proof_round_trip() {
        let statuses: Vec<TxVerifyResult> = (0..5)
            .map(|i| TxVerifyResult {
                status_fail: i % 2 == 0,
            })
            .collect();
        let root = status_merkle_root(&statuses).expect("status root");
        let status_ids: Vec<Hash> = statuses
            .iter()
            .map(|s| status_leaf_id(s).expect("status id"))
            .collect();
        let mask = reveal_mask(5, &[1, 4]);
        let (hashes, flags) = build_merkle_proof(&status_ids, &mask);
        let revealed = vec![statuses[1], statuses[4]];
        assert!(validate_status_merkle_proof(&hashes, &flags, &revealed, &root));

        let wrong = vec![
            TxVerifyResult {
                status_fail: !statuses[1].status_fail,
            },
            statuses[4],
        ];
        assert!(!validate_status_merkle_proof(&hashes, &flags, &wrong, &root));
    }
}

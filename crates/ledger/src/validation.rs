//! Contextual header validation.
//!
//! Run by the chain state machine before a header enters the index. Only
//! header rules live here: parent linkage, difficulty schedule, timestamp
//! window and proof-of-work. Transaction-level validation is not the light
//! node's job; the merkle validator already tied the revealed body to the
//! header's commitments upstream.

use std::time::{SystemTime, UNIX_EPOCH};

use aurum_core::difficulty::{
    calc_next_bits, check_proof_of_work, BLOCKS_PER_RETARGET, MAX_TIME_OFFSET_SECONDS,
};
use aurum_core::{BlockHeader, PowCache};

use crate::block_index::{BlockIndex, NodeHandle};
use crate::error::{LedgerError, LedgerResult};

/// Number of ancestor timestamps feeding the median-time-past rule.
const MEDIAN_TIME_SPAN: usize = 11;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Ancestor of `from` at `height`, following parent handles.
fn ancestor(index: &BlockIndex, from: NodeHandle, height: u64) -> Option<NodeHandle> {
    let mut cursor = from;
    loop {
        let node = index.node(cursor);
        if node.height() == height {
            return Some(cursor);
        }
        cursor = node.parent?;
    }
}

/// Median timestamp of the last [`MEDIAN_TIME_SPAN`] blocks ending at
/// `parent`, inclusive.
fn median_time_past(index: &BlockIndex, parent: NodeHandle) -> u64 {
    let mut timestamps = Vec::with_capacity(MEDIAN_TIME_SPAN);
    let mut cursor = Some(parent);
    while let Some(handle) = cursor {
        if timestamps.len() == MEDIAN_TIME_SPAN {
            break;
        }
        let node = index.node(handle);
        timestamps.push(node.header.timestamp);
        cursor = node.parent;
    }
    timestamps.sort_unstable();
    timestamps[timestamps.len() / 2]
}

/// Difficulty bits required for the child of `parent`.
pub(crate) fn expected_bits(index: &BlockIndex, parent: NodeHandle) -> LedgerResult<u64> {
    let parent_node = index.node(parent);
    let next_height = parent_node.height() + 1;
    if next_height % BLOCKS_PER_RETARGET != 0 {
        return Ok(parent_node.header.bits);
    }
    let window_start = next_height - BLOCKS_PER_RETARGET;
    let compare =
        ancestor(index, parent, window_start).ok_or_else(|| LedgerError::Inconsistency {
            reason: format!("no ancestor at retarget height {window_start}"),
        })?;
    Ok(calc_next_bits(
        &parent_node.header,
        &index.node(compare).header,
    ))
}

/// Validates `header` as the child of `parent`.
pub(crate) fn validate_header(
    index: &BlockIndex,
    parent: NodeHandle,
    header: &BlockHeader,
    pow_cache: &PowCache,
) -> LedgerResult<()> {
    let hash = header.hash();
    let parent_node = index.node(parent);

    if header.previous_block_hash != parent_node.hash {
        return Err(LedgerError::InvalidHeader {
            hash,
            reason: "previous hash does not name the parent".into(),
        });
    }
    if header.height != parent_node.height() + 1 {
        return Err(LedgerError::InvalidHeader {
            hash,
            reason: format!(
                "height {} does not follow parent height {}",
                header.height,
                parent_node.height()
            ),
        });
    }

    if header.timestamp > unix_now() + MAX_TIME_OFFSET_SECONDS {
        return Err(LedgerError::InvalidHeader {
            hash,
            reason: "timestamp too far in the future".into(),
        });
    }
    let median = median_time_past(index, parent);
    if header.timestamp <= median {
        return Err(LedgerError::InvalidHeader {
            hash,
            reason: format!("timestamp {} not after median time past {median}", header.timestamp),
        });
    }

    let expected = expected_bits(index, parent)?;
    if header.bits != expected {
        return Err(LedgerError::InvalidHeader {
            hash,
            reason: format!("bits {:#x} do not match required {expected:#x}", header.bits),
        });
    }

    let seed = parent_node.calc_next_seed();
    if !pow_cache.contains(&hash, &seed) && !check_proof_of_work(&hash, &seed, header.bits) {
        return Err(LedgerError::InvalidHeader {
            hash,
            reason: "proof of work below target".into(),
        });
    }

    Ok(())
}

//! Compact-bits difficulty encoding, cumulative work and proof-of-work.
//!
//! A header's `bits` field packs a 256-bit target into a u64: the top byte
//! is a base-256 exponent, bit 55 is a sign marker (always clear for a valid
//! target) and the low 55 bits are the mantissa. Work is the expected number
//! of hash attempts the target represents, `2^256 / (target + 1)`, and the
//! sum of work along a branch is what reorg decisions compare.

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use sha2::{Digest, Sha256};

use crate::types::{BlockHeader, Hash};

/// Number of blocks between difficulty retargets.
pub const BLOCKS_PER_RETARGET: u64 = 2016;
/// Target block interval in seconds.
pub const TARGET_SECONDS_PER_BLOCK: u64 = 150;
/// Number of blocks sharing one proof-of-work seed epoch.
pub const SEED_PER_RETARGET: u64 = 256;
/// Maximum allowed drift of a header timestamp into the future, in seconds.
pub const MAX_TIME_OFFSET_SECONDS: u64 = 3600;

const SIGN_BIT: u64 = 0x0080_0000_0000_0000;
const MANTISSA_MASK: u64 = 0x007f_ffff_ffff_ffff;
const HIGH_BITS: u64 = 0xff80_0000_0000_0000;

/// Expands a compact-bits value into the target it encodes. A value with the
/// sign bit set does not encode a target and expands to zero.
pub fn compact_to_big(bits: u64) -> BigUint {
    if bits & SIGN_BIT != 0 {
        return BigUint::zero();
    }
    let exponent = bits >> 56;
    let mantissa = bits & MANTISSA_MASK;
    if exponent <= 8 {
        BigUint::from(mantissa >> (8 * (8 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 8))
    }
}

/// Packs a target into compact-bits form. Inverse of [`compact_to_big`] up
/// to mantissa truncation.
pub fn big_to_compact(target: &BigUint) -> u64 {
    if target.is_zero() {
        return 0;
    }
    let mut exponent = target.to_bytes_be().len() as u64;
    let mut mantissa = if exponent <= 8 {
        target.to_u64().unwrap_or(u64::MAX) << (8 * (8 - exponent))
    } else {
        (target >> (8 * (exponent - 8)))
            .to_u64()
            .unwrap_or(u64::MAX)
    };
    while mantissa & HIGH_BITS != 0 {
        mantissa >>= 8;
        exponent += 1;
    }
    (exponent << 56) | mantissa
}

/// Expected number of hash attempts the encoded target represents.
pub fn calc_work(bits: u64) -> BigUint {
    let target = compact_to_big(bits);
    if target.is_zero() {
        return BigUint::zero();
    }
    (BigUint::one() << 256u32) / (target + BigUint::one())
}

/// Mixing hash the proof-of-work check runs over: the block hash salted
/// with the epoch seed.
pub fn pow_hash(block_hash: &Hash, seed: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(block_hash.as_bytes());
    hasher.update(seed.as_bytes());
    Hash::new(hasher.finalize().into())
}

/// Whether `block_hash` under `seed` satisfies the target encoded by `bits`.
pub fn check_proof_of_work(block_hash: &Hash, seed: &Hash, bits: u64) -> bool {
    let target = compact_to_big(bits);
    if target.is_zero() {
        return false;
    }
    BigUint::from_bytes_be(pow_hash(block_hash, seed).as_bytes()) <= target
}

/// Difficulty bits required for the block following `last`.
///
/// Off a retarget boundary the bits carry over. On a boundary the target is
/// rescaled by the ratio of the actual interval since `compare` (the first
/// header of the closing window) to the intended interval.
pub fn calc_next_bits(last: &BlockHeader, compare: &BlockHeader) -> u64 {
    if BLOCKS_PER_RETARGET == 0 || (last.height + 1) % BLOCKS_PER_RETARGET != 0 {
        return last.bits;
    }
    let target_time = BLOCKS_PER_RETARGET * TARGET_SECONDS_PER_BLOCK;
    let actual_time = last.timestamp.saturating_sub(compare.timestamp).max(1);
    let new_target = compact_to_big(last.bits) * actual_time / target_time;
    big_to_compact(&new_target)
}

/// Increments the nonce until the header satisfies its own bits target.
/// Miner glue and test fixtures share this; it is not on any hot path.
pub fn solve(header: &mut BlockHeader, seed: &Hash) {
    while !check_proof_of_work(&header.hash(), seed, header.bits) {
        header.nonce = header.nonce.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_round_trips() {
        for exponent in [1u32, 100, 200, 255] {
            let target = BigUint::one() << exponent;
            let bits = big_to_compact(&target);
            assert_eq!(compact_to_big(bits), target, "exponent {exponent}");
        }
    }

    #[test]
    fn sign_bit_encodes_no_target() {
        assert!(compact_to_big(SIGN_BIT | (9 << 56)).is_zero());
        assert!(calc_work(SIGN_BIT).is_zero());
    }

    #[test]
    fn lower_target_means_more_work() {
        let easy = big_to_compact(&(BigUint::one() << 255u32));
        let hard = big_to_compact(&(BigUint::one() << 200u32));
        assert!(calc_work(hard) > calc_work(easy));
    }

    #[test]
    fn solve_then_check() {
        let mut header = BlockHeader {
            version: 1,
            height: 1,
            previous_block_hash: Hash::new([5; 32]),
            timestamp: 1_700_000_000,
            nonce: 0,
            bits: big_to_compact(&(BigUint::one() << 250u32)),
            transactions_merkle_root: Hash::ZERO,
            transaction_status_hash: Hash::ZERO,
        };
        let seed = Hash::ZERO;
        solve(&mut header, &seed);
        assert!(check_proof_of_work(&header.hash(), &seed, header.bits));
    }

    #[test]
    fn bits_carry_over_off_retarget_boundary() {
        let header = BlockHeader {
            version: 1,
            height: 10,
            previous_block_hash: Hash::ZERO,
            timestamp: 1_700_000_000,
            nonce: 0,
            bits: 0x2100_0000_0000_4242,
            transactions_merkle_root: Hash::ZERO,
            transaction_status_hash: Hash::ZERO,
        };
        assert_eq!(calc_next_bits(&header, &header), header.bits);
    }

    #[test]
    fn retarget_scales_with_elapsed_time() {
        let bits = big_to_compact(&(BigUint::one() << 240u32));
        let compare = BlockHeader {
            version: 1,
            height: 0,
            previous_block_hash: Hash::ZERO,
            timestamp: 1_700_000_000,
            nonce: 0,
            bits,
            transactions_merkle_root: Hash::ZERO,
            transaction_status_hash: Hash::ZERO,
        };
        let mut last = compare.clone();
        last.height = BLOCKS_PER_RETARGET - 1;

        // Blocks came in twice as fast as intended: the target halves.
        last.timestamp = compare.timestamp + BLOCKS_PER_RETARGET * TARGET_SECONDS_PER_BLOCK / 2;
        let faster = compact_to_big(calc_next_bits(&last, &compare));
        assert!(faster < compact_to_big(bits));

        // Twice as slow: the target doubles.
        last.timestamp = compare.timestamp + BLOCKS_PER_RETARGET * TARGET_SECONDS_PER_BLOCK * 2;
        let slower = compact_to_big(calc_next_bits(&last, &compare));
        assert!(slower > compact_to_big(bits));
    }
}

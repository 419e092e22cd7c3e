//! Per-network chain parameters.

use aurum_core::{BlockHeader, Hash};

/// Compact encoding of a 2^255 target: effectively every hash wins, which is
/// what a private development network wants.
const DEVNET_BITS: u64 = 0x2200_8000_0000_0000;

/// A compiled-in trust anchor: any header at or above `height` must lie on
/// the branch containing `hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub height: u64,
    pub hash: Hash,
}

/// Chain parameters for one network, threaded through construction as an
/// explicit context value.
#[derive(Debug, Clone)]
pub struct NetworkParams {
    pub network: super::NetworkType,
    /// The genesis header; its hash anchors the whole index.
    pub genesis: BlockHeader,
    /// Trust anchors in strictly increasing height order.
    pub checkpoints: Vec<Checkpoint>,
}

const MAINNET_CHECKPOINTS: &[(u64, &str)] = &[
    (
        10_000,
        "4a0bc3c4e6c67b1abaa4e5cbdd3b4ba1b876bbe2fae8c84fe55d6e1b36d52181",
    ),
    (
        50_000,
        "96a4c69b0ad4b38b55b95b3072fc12b6dca664c30e0f26f88245e04e4a959a0e",
    ),
    (
        100_000,
        "0e63ec68120e29b9c3f0a9a6440c46547eeb0b4a1d6a102b323e1d62a751e859",
    ),
    (
        200_000,
        "9fb0de63c38e3af978d5bbc2b1a4dd5c05bfd1dbbf8bdf264231ff756fc2ff0a",
    ),
];

const TESTNET_CHECKPOINTS: &[(u64, &str)] = &[
    (
        10_000,
        "b4b03d1b1894cde907cfdb7e2c0a7c4e1fda82dbe4a85a49764e017a7b0cf6e1",
    ),
    (
        40_000,
        "1f0e7b55cf8a1b3fa4e0c74f8709c3e2d84e36ce86c744ae5d90bde56ecf1b27",
    ),
];

fn parse_checkpoints(table: &[(u64, &str)]) -> Vec<Checkpoint> {
    table
        .iter()
        .filter_map(|&(height, hash)| {
            Hash::from_hex_str(hash)
                .ok()
                .map(|hash| Checkpoint { height, hash })
        })
        .collect()
}

fn genesis_header(timestamp: u64, bits: u64) -> BlockHeader {
    BlockHeader {
        version: 1,
        height: 0,
        previous_block_hash: Hash::ZERO,
        timestamp,
        nonce: 0,
        bits,
        transactions_merkle_root: Hash::ZERO,
        transaction_status_hash: Hash::ZERO,
    }
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        Self {
            network: super::NetworkType::Mainnet,
            genesis: genesis_header(1_524_549_600, 0x2000_0000_2000_0000),
            checkpoints: parse_checkpoints(MAINNET_CHECKPOINTS),
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: super::NetworkType::Testnet,
            genesis: genesis_header(1_528_945_000, 0x2100_0000_0080_0000),
            checkpoints: parse_checkpoints(TESTNET_CHECKPOINTS),
        }
    }

    /// Private development network: trivial difficulty, no checkpoints.
    pub fn devnet() -> Self {
        Self {
            network: super::NetworkType::Devnet,
            genesis: genesis_header(1_528_945_000, DEVNET_BITS),
            checkpoints: Vec::new(),
        }
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis.hash()
    }
}

//! Network identity.

use serde::{Deserialize, Serialize};

/// Which chain this node participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// The production network.
    #[default]
    Mainnet,
    /// The public test network.
    Testnet,
    /// A private development network with trivial difficulty.
    Devnet,
}

impl NetworkType {
    /// Parses a network name as written in config files and CLI flags.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Some(NetworkType::Mainnet),
            "testnet" | "test" => Some(NetworkType::Testnet),
            "devnet" | "dev" | "local" => Some(NetworkType::Devnet),
            _ => None,
        }
    }
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkType::Mainnet => write!(f, "mainnet"),
            NetworkType::Testnet => write!(f, "testnet"),
            NetworkType::Devnet => write!(f, "devnet"),
        }
    }
}

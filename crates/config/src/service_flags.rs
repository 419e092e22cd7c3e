//! Service flags advertised by peers.

use serde::{Deserialize, Serialize};

/// Bit-packed description of the services a peer provides. One u64 leaves
/// room for 64 services; a peer satisfies a requirement iff its flag set is
/// a superset of the required bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceFlags(pub u64);

impl ServiceFlags {
    /// No services at all.
    pub const NONE: Self = Self(0);
    /// Serves full blocks and headers.
    pub const FULL_NODE: Self = Self(1);
    /// Serves headers-first (checkpoint-bounded) sync.
    pub const FAST_SYNC: Self = Self(1 << 1);
    /// Serves merkle blocks with SPV proofs.
    pub const SPV_PROOF: Self = Self(1 << 2);
    /// What this node itself advertises.
    pub const DEFAULT_SERVICES: Self = Self::FAST_SYNC;

    /// Whether every bit of `required` is present in this flag set.
    pub fn contains(self, required: ServiceFlags) -> bool {
        self.0 & required.0 == required.0
    }
}

impl std::ops::BitOr for ServiceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ServiceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

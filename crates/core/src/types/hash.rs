//! 32-byte content identifier used for blocks, transactions and commitments.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

const HASH_LEN: usize = 32;

/// Opaque 256-bit content hash.
///
/// Ordering is the lexicographic order of the raw bytes; it exists so hashes
/// can key ordered collections, it carries no chain meaning.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    pub const LENGTH: usize = HASH_LEN;
    pub const ZERO: Self = Self([0u8; HASH_LEN]);

    #[inline]
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn from_slice(slice: &[u8]) -> Result<Self, CoreError> {
        if slice.len() != HASH_LEN {
            return Err(CoreError::InvalidHashLength {
                len: slice.len(),
                expected: HASH_LEN,
            });
        }
        let mut buf = [0u8; HASH_LEN];
        buf.copy_from_slice(slice);
        Ok(Self(buf))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    #[inline]
    pub fn to_array(self) -> [u8; HASH_LEN] {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn from_hex_str(value: &str) -> Result<Self, CoreError> {
        let trimmed = value.trim();
        let without_prefix = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if without_prefix.len() != HASH_LEN * 2 {
            return Err(CoreError::InvalidHashLength {
                len: without_prefix.len() / 2,
                expected: HASH_LEN,
            });
        }
        let bytes = hex::decode(without_prefix).map_err(|e| CoreError::InvalidHashHex {
            reason: e.to_string(),
        })?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl FromStr for Hash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex_str(s)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex_str(&value).map_err(D::Error::custom)
    }
}

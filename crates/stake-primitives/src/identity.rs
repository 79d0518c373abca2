// stake-primitives/src/identity.rs

use crate::{PrimitivesError, PrimitivesResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Identity size in bytes
pub const IDENTITY_SIZE: usize = 20;

/// Opaque staking identity (validator, manager or listener address)
///
/// Ordering is plain byte order; the registry uses it to break ties between
/// equal stakes. Human-readable formats carry it as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Identity([u8; IDENTITY_SIZE]);

impl Identity {
    /// Create identity from bytes
    pub fn new(bytes: [u8; IDENTITY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Derive a deterministic identity from an arbitrary label
    /// (last 20 bytes of its SHA-256, Ethereum style)
    pub fn derive(label: &[u8]) -> Self {
        let digest = Sha256::digest(label);
        let mut bytes = [0u8; IDENTITY_SIZE];
        bytes.copy_from_slice(&digest[12..32]);
        Self(bytes)
    }

    /// Identity whose last byte is `n`; handy for small fixtures
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; IDENTITY_SIZE];
        bytes[IDENTITY_SIZE - 8..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> PrimitivesResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| PrimitivesError::InvalidIdentity(e.to_string()))?;
        if bytes.len() != IDENTITY_SIZE {
            return Err(PrimitivesError::InvalidIdentity(format!(
                "expected {} bytes, got {}",
                IDENTITY_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; IDENTITY_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn zero() -> Self {
        Self([0u8; IDENTITY_SIZE])
    }

    /// Short form for log lines: `0x1234..abcd`
    pub fn short(&self) -> String {
        format!(
            "0x{}..{}",
            hex::encode(&self.0[..2]),
            hex::encode(&self.0[IDENTITY_SIZE - 2..])
        )
    }
}

impl FromStr for Identity {
    type Err = PrimitivesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; IDENTITY_SIZE]>::deserialize(deserializer).map(Self)
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.short())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::zero()
    }
}

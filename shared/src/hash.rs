use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

/// A 256-bit SHA-256 digest, used for transaction ids, block hashes and
/// Merkle nodes. Serializes as a lowercase hex string, so it can be used
/// directly as a JSON object key (the `txid -> Transaction` map).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash256([u8; 32]);

impl Serialize for Hash256 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

impl Hash256 {
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// `SHA256(SHA256(data))`, used for block header hashing.
    #[must_use]
    pub fn double_sha256(data: &[u8]) -> Self {
        Self::sha256(Self::sha256(data).as_bytes())
    }

    #[must_use]
    pub fn meets_target(&self, target: &Target) -> bool {
        self.0 <= target.as_bytes()
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(Error::InvalidKey(format!(
                "expected 32-byte hash, got {} bytes",
                bytes.len()
            )));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(self.0))
    }
}

/// 8-hex-character compact proof-of-work target: one exponent byte plus a
/// three-byte mantissa, decoded as `mantissa * 256^(exponent - 3)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    exponent: u8,
    mantissa: [u8; 3],
}

impl Target {
    pub const MANTISSA: [u8; 3] = [0xff, 0xff, 0xff];

    /// Builds the compact target for a given difficulty `d`, per the
    /// adaptive-difficulty rule `exponent = 32 - d`.
    #[must_use]
    pub fn from_difficulty(d: u8) -> Self {
        Self {
            exponent: 32u8.saturating_sub(d),
            mantissa: Self::MANTISSA,
        }
    }

    pub fn parse(hex_str: &str) -> Result<Self> {
        if hex_str.len() != 8 {
            return Err(Error::InvalidTarget(format!(
                "expected 8 hex chars, got {}",
                hex_str.len()
            )));
        }
        let bytes = hex::decode(hex_str)?;
        Ok(Self {
            exponent: bytes[0],
            mantissa: [bytes[1], bytes[2], bytes[3]],
        })
    }

    #[must_use]
    pub fn encode(&self) -> String {
        format!("{:02x}{}", self.exponent, hex::encode(self.mantissa))
    }

    /// The 256-bit numeric target, as a big-endian byte array, so that
    /// array comparison equals numeric comparison.
    #[must_use]
    pub fn as_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let e = self.exponent as usize;
        if (3..=32).contains(&e) {
            let offset = 32 - e;
            out[offset..offset + 3].copy_from_slice(&self.mantissa);
        }
        out
    }
}

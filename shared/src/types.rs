//! Shared value types: fixed-point amounts, hex aliases and the chain's
//! sentinel constants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Hex-encoded (DER) public key, as carried on the wire.
pub type PubKeyHex = String;

/// Hex-encoded PSS signature, as carried on the wire.
pub type SignatureHex = String;

/// Chain height, 0-indexed.
pub type BlockHeight = u64;

/// The sentinel parent hash of the genesis block: 64 ASCII `'0'` characters.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// `base` term of the adaptive-difficulty formula (`d = base + floor(log4(n+1))`).
pub const BASE_DIFFICULTY: u8 = 2;

/// Fixed-point monetary amount, stored as thousandths of a unit so that the
/// coinbase reward (`3.125`) and fee arithmetic never hit floating-point
/// equality pitfalls. Serializes to JSON as a plain number (integer when
/// exact, decimal otherwise) so it round-trips through the wire protocol
/// the way the reference implementation's `int | float` amounts do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.0 % 1000 == 0 {
            serializer.serialize_i64(self.0 / 1000)
        } else {
            serializer.serialize_f64(self.0 as f64 / 1000.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Ok(Self((value * 1000.0).round() as i64))
    }
}

impl Amount {
    pub const ZERO: Self = Self(0);
    /// `reward = 3.125`.
    pub const REWARD: Self = Self(3125);

    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub const fn millis(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Renders the decimal form used as a signature payload, matching
    /// Python's `str(amount)` on a value that may or may not carry a
    /// fractional part: integral amounts render without a decimal point,
    /// fractional ones drop trailing zeros.
    #[must_use]
    pub fn to_payload_string(self) -> String {
        let whole = self.0 / 1000;
        let frac = (self.0 % 1000).abs();
        if frac == 0 {
            return whole.to_string();
        }
        let frac_str = format!("{frac:03}");
        let trimmed = frac_str.trim_end_matches('0');
        format!("{whole}.{trimmed}")
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_payload_string())
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_payload_string_strips_trailing_zeros() {
        assert_eq!(Amount::REWARD.to_payload_string(), "3.125");
        assert_eq!(Amount::from_millis(10000).to_payload_string(), "10");
        assert_eq!(Amount::from_millis(1500).to_payload_string(), "1.5");
    }

    #[test]
    fn genesis_hash_is_64_zeros() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn amount_arithmetic() {
        let a = Amount::from_millis(10000);
        let b = Amount::from_millis(1000);
        assert_eq!((a - b).millis(), 9000);
        assert_eq!(a.checked_add(b), Some(Amount::from_millis(11000)));
    }
}

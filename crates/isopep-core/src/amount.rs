//! # Token Amounts
//!
//! [`Amount`] is a non-negative integer count of the smallest token unit.
//! Arithmetic is checked; an overflow is an error, never a wrap.
//!
//! Amounts serialize as decimal strings so that canonical JSON never has to
//! carry numbers wider than 64 bits. Deserialization accepts either a
//! decimal string or a JSON integer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// A non-negative token quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount(u128);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw unit count.
    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    /// The raw unit count.
    pub fn units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Multiply by a unit count, e.g. `unit_price * quantity`.
    pub fn checked_mul(self, factor: u64) -> Option<Amount> {
        self.0.checked_mul(u128::from(factor)).map(Amount)
    }

    /// Parse a decimal string of ASCII digits.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let t = s.trim();
        if t.is_empty() || !t.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidAmount {
                value: s.to_string(),
                reason: "expected a non-negative decimal integer".into(),
            });
        }
        t.parse::<u128>()
            .map(Self)
            .map_err(|e| ValidationError::InvalidAmount {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(u128::from(units))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Text(String),
    Integer(u64),
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match AmountRepr::deserialize(deserializer)? {
            AmountRepr::Text(s) => Amount::parse(&s).map_err(serde::de::Error::custom),
            AmountRepr::Integer(n) => Ok(Amount::from(n)),
        }
    }
}

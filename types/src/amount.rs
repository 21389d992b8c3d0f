//! Balance and weight amounts.
//!
//! Amounts are raw u128 units. The genesis account is seeded with the full
//! supply; everything else follows from send/receive arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A raw amount of currency or voting weight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Self = Self(0);
    /// The total supply minted into the genesis account.
    pub const GENESIS: Self = Self(u128::MAX);

    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Parse a decimal string, as stored in the config file.
    pub fn decode_dec(s: &str) -> Option<Self> {
        s.parse::<u128>().ok().map(Self)
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

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_sub_underflow() {
        assert!(Amount::new(1).checked_sub(Amount::new(2)).is_none());
        assert_eq!(
            Amount::new(5).checked_sub(Amount::new(2)),
            Some(Amount::new(3))
        );
    }

    #[test]
    fn decode_dec() {
        assert_eq!(Amount::decode_dec("0"), Some(Amount::ZERO));
        assert_eq!(Amount::decode_dec("12345"), Some(Amount::new(12345)));
        assert!(Amount::decode_dec("-1").is_none());
        assert!(Amount::decode_dec("abc").is_none());
    }
}

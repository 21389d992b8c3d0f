//! Account identifiers.
//!
//! An account is the Ed25519 public key that signs the account's chain.
//! The textual encoding is `lat_` followed by the uppercase hex of the key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix for the textual account encoding.
pub const ACCOUNT_PREFIX: &str = "lat_";

/// A 32-byte account identifier (Ed25519 public key).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account([u8; 32]);

impl Default for Account {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Account {
    /// The zero account, used as a placeholder (e.g. the seed entry in a
    /// vote tally). It carries no voting weight.
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Encode as an account string (`lat_` + 64 uppercase hex characters).
    pub fn encode_account(&self) -> String {
        format!("{}{}", ACCOUNT_PREFIX, self)
    }

    /// Decode an account string. Accepts both the prefixed encoding and a
    /// bare 64-character hex key (the pre-v2 config format).
    pub fn decode_account(s: &str) -> Option<Self> {
        let hex_part = s.strip_prefix(ACCOUNT_PREFIX).unwrap_or(s);
        Self::decode_hex(hex_part)
    }

    /// Parse a bare 64-character hex key.
    pub fn decode_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let account = Account::new([0x5A; 32]);
        let text = account.encode_account();
        assert!(text.starts_with("lat_"));
        assert_eq!(Account::decode_account(&text), Some(account));
    }

    #[test]
    fn decode_accepts_bare_hex() {
        let account = Account::new([0x11; 32]);
        let bare = account.to_string();
        assert_eq!(Account::decode_account(&bare), Some(account));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Account::decode_account("lat_nothex").is_none());
        assert!(Account::decode_account("").is_none());
    }
}

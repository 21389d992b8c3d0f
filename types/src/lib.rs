//! Fundamental types for the lattice protocol.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: accounts, block hashes, amounts, keys, timestamps, and the
//! network identifier.

pub mod account;
pub mod amount;
pub mod hash;
pub mod keys;
pub mod network;
pub mod time;

pub use account::Account;
pub use amount::Amount;
pub use hash::{BlockHash, Root};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use time::Timestamp;

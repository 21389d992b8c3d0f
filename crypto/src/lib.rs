//! Cryptographic primitives: Blake2b hashing and Ed25519 signing.

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_parts};
pub use keys::{derive_account, generate_keypair, keypair_from_seed};
pub use sign::{sign_message, verify_signature};

//! Ed25519 key generation and account derivation.

use ed25519_dalek::SigningKey;
use lattice_types::{Account, KeyPair, PrivateKey, PublicKey};
use rand::rngs::OsRng;
use rand::RngCore;

/// Generate a fresh random key pair.
pub fn generate_keypair() -> KeyPair {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    keypair_from_seed(&seed)
}

/// Derive a deterministic key pair from a 32-byte seed.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing = SigningKey::from_bytes(seed);
    let public = signing.verifying_key().to_bytes();
    KeyPair {
        public: PublicKey(public),
        private: PrivateKey(*seed),
    }
}

/// The account identified by a public key.
pub fn derive_account(public: &PublicKey) -> Account {
    Account::new(*public.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic() {
        let a = keypair_from_seed(&[7u8; 32]);
        let b = keypair_from_seed(&[7u8; 32]);
        assert_eq!(a.public, b.public);
    }

    #[test]
    fn distinct_seeds_distinct_keys() {
        let a = keypair_from_seed(&[1u8; 32]);
        let b = keypair_from_seed(&[2u8; 32]);
        assert_ne!(a.public, b.public);
    }

    #[test]
    fn account_matches_public_key() {
        let kp = keypair_from_seed(&[3u8; 32]);
        assert_eq!(derive_account(&kp.public).as_bytes(), kp.public.as_bytes());
    }
}

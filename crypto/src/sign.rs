//! Message signing and verification.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use lattice_types::{PrivateKey, PublicKey, Signature};

/// Sign `message` with the given private key.
pub fn sign_message(message: &[u8], private: &PrivateKey) -> Signature {
    let signing = SigningKey::from_bytes(&private.0);
    Signature(signing.sign(message).to_bytes())
}

/// Verify `signature` over `message` against `public`.
pub fn verify_signature(message: &[u8], public: &PublicKey, signature: &Signature) -> bool {
    let Ok(verifying) = VerifyingKey::from_bytes(public.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keypair_from_seed;

    #[test]
    fn sign_and_verify() {
        let kp = keypair_from_seed(&[9u8; 32]);
        let sig = sign_message(b"payload", &kp.private);
        assert!(verify_signature(b"payload", &kp.public, &sig));
    }

    #[test]
    fn tampered_message_fails() {
        let kp = keypair_from_seed(&[9u8; 32]);
        let sig = sign_message(b"payload", &kp.private);
        assert!(!verify_signature(b"payloae", &kp.public, &sig));
    }

    #[test]
    fn wrong_key_fails() {
        let kp = keypair_from_seed(&[9u8; 32]);
        let other = keypair_from_seed(&[10u8; 32]);
        let sig = sign_message(b"payload", &kp.private);
        assert!(!verify_signature(b"payload", &other.public, &sig));
    }
}

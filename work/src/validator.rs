//! Work value computation and validation.

use lattice_crypto::blake2b_256_parts;
use lattice_types::Root;

/// The work value of `nonce` against `root`: the first eight bytes of
/// `Blake2b-256(root ‖ nonce_le)`, little-endian. Higher is stronger.
pub fn work_value(root: &Root, nonce: u64) -> u64 {
    let digest = blake2b_256_parts(&[root.as_bytes(), &nonce.to_le_bytes()]);
    u64::from_le_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

/// Whether `nonce` meets `threshold` for `root`.
pub fn work_validate(root: &Root, nonce: u64, threshold: u64) -> bool {
    work_value(root, nonce) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::WorkGenerator;
    use lattice_types::BlockHash;

    fn root(byte: u8) -> Root {
        Root::from(BlockHash::new([byte; 32]))
    }

    #[test]
    fn zero_threshold_accepts_anything() {
        assert!(work_validate(&root(0), 0, 0));
        assert!(work_validate(&root(1), 12345, 0));
    }

    #[test]
    fn max_threshold_rejects() {
        // A fixed nonce will essentially never reach u64::MAX
        assert!(!work_validate(&root(0xFF), 12345, u64::MAX));
    }

    #[test]
    fn generated_nonce_validates() {
        let generator = WorkGenerator::new(2);
        let threshold = 0xff00_0000_0000_0000;
        let nonce = generator.generate(&root(0x42), threshold);
        assert!(work_validate(&root(0x42), nonce, threshold));
        // The same nonce is bound to its root
        let value_here = work_value(&root(0x42), nonce);
        let value_there = work_value(&root(0x43), nonce);
        assert_ne!(value_here, value_there);
    }

    #[test]
    fn value_is_deterministic() {
        assert_eq!(work_value(&root(7), 99), work_value(&root(7), 99));
    }
}

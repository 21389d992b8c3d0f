//! Blake2b-256 digests.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Compute the Blake2b-256 digest of `data`.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the Blake2b-256 digest of several concatenated parts without
/// allocating an intermediate buffer.
pub fn blake2b_256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(blake2b_256(b"abc"), blake2b_256(b"abc"));
        assert_ne!(blake2b_256(b"abc"), blake2b_256(b"abd"));
    }

    #[test]
    fn parts_equal_concatenation() {
        assert_eq!(blake2b_256(b"hello world"), blake2b_256_parts(&[b"hello", b" ", b"world"]));
    }
}

//! Local CPU work generation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use lattice_types::Root;
use rand::Rng;

use crate::validator::work_validate;

/// Multi-threaded nonce search.
#[derive(Clone)]
pub struct WorkGenerator {
    threads: usize,
}

impl WorkGenerator {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// Search until a nonce meeting `threshold` is found. Each thread starts
    /// from a random offset and steps by the thread count.
    pub fn generate(&self, root: &Root, threshold: u64) -> u64 {
        let found = Arc::new(AtomicBool::new(false));
        let result = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..self.threads)
            .map(|offset| {
                let found = Arc::clone(&found);
                let result = Arc::clone(&result);
                let root = *root;
                let stride = self.threads as u64;
                std::thread::spawn(move || {
                    let mut nonce = rand::thread_rng()
                        .gen::<u64>()
                        .wrapping_add(offset as u64);
                    while !found.load(Ordering::Relaxed) {
                        if work_validate(&root, nonce, threshold) {
                            result.store(nonce, Ordering::Relaxed);
                            found.store(true, Ordering::Relaxed);
                            break;
                        }
                        nonce = nonce.wrapping_add(stride);
                    }
                })
            })
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
        result.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_types::BlockHash;

    #[test]
    fn single_thread_finds_work() {
        let generator = WorkGenerator::new(1);
        let root = Root::from(BlockHash::new([1u8; 32]));
        let threshold = 0xff00_0000_0000_0000;
        let nonce = generator.generate(&root, threshold);
        assert!(work_validate(&root, nonce, threshold));
    }

    #[test]
    fn zero_thread_count_clamped() {
        let generator = WorkGenerator::new(0);
        let root = Root::from(BlockHash::new([2u8; 32]));
        let nonce = generator.generate(&root, 0);
        assert!(work_validate(&root, nonce, 0));
    }
}

//! Locally held representative keys.
//!
//! This is the seam to wallet key management: the node only ever needs to
//! enumerate the representative keys it can sign with, to produce
//! confirm_acks and local election votes.

use std::sync::{Arc, Mutex};

use lattice_crypto::derive_account;
use lattice_ledger::Block;
use lattice_types::{Account, KeyPair, PrivateKey};

use crate::vote::Vote;

/// The set of representative keys held by this node.
#[derive(Default)]
pub struct RepresentativeSet {
    keys: Mutex<Vec<(Account, PrivateKey)>>,
}

impl RepresentativeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, keypair: KeyPair) {
        let account = derive_account(&keypair.public);
        let mut keys = self.keys.lock().expect("representative lock poisoned");
        if keys.iter().all(|(existing, _)| *existing != account) {
            keys.push((account, keypair.private));
        }
    }

    /// Whether this node holds any representative key.
    pub fn any(&self) -> bool {
        !self.keys.lock().expect("representative lock poisoned").is_empty()
    }

    pub fn foreach(&self, mut f: impl FnMut(&Account, &PrivateKey)) {
        let keys = self.keys.lock().expect("representative lock poisoned");
        for (account, private) in keys.iter() {
            f(account, private);
        }
    }

    /// One signed vote per held key for `block` at `sequence`.
    pub fn generate_votes(&self, block: &Arc<Block>, sequence: u64) -> Vec<Vote> {
        let keys = self.keys.lock().expect("representative lock poisoned");
        keys.iter()
            .map(|(account, private)| {
                Vote::new(*account, private, sequence, Arc::clone(block))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_crypto::keypair_from_seed;
    use lattice_ledger::SendBlock;
    use lattice_types::{Amount, BlockHash, Signature};

    fn sample_block() -> Arc<Block> {
        Arc::new(Block::Send(SendBlock {
            previous: BlockHash::new([1u8; 32]),
            destination: Account::new([2u8; 32]),
            balance: Amount::new(5),
            work: 0,
            signature: Signature::ZERO,
        }))
    }

    #[test]
    fn empty_set_has_no_votes() {
        let reps = RepresentativeSet::new();
        assert!(!reps.any());
        assert!(reps.generate_votes(&sample_block(), 1).is_empty());
    }

    #[test]
    fn votes_signed_per_key() {
        let reps = RepresentativeSet::new();
        reps.insert(keypair_from_seed(&[1u8; 32]));
        reps.insert(keypair_from_seed(&[2u8; 32]));
        assert!(reps.any());

        let votes = reps.generate_votes(&sample_block(), 4);
        assert_eq!(votes.len(), 2);
        for vote in &votes {
            assert_eq!(vote.sequence, 4);
            assert!(vote.validate());
        }
    }

    #[test]
    fn duplicate_key_ignored() {
        let reps = RepresentativeSet::new();
        reps.insert(keypair_from_seed(&[1u8; 32]));
        reps.insert(keypair_from_seed(&[1u8; 32]));
        assert_eq!(reps.generate_votes(&sample_block(), 1).len(), 1);
    }
}

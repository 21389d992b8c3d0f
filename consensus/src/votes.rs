//! Per-root vote bookkeeping.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use lattice_ledger::Block;
use lattice_types::{Account, Root};

use crate::vote::Vote;

/// Votes observed for one root. Maps each representative to its latest
/// `(sequence, block)`; a vote overrides an existing entry only when its
/// sequence is strictly greater.
#[derive(Clone, Debug)]
pub struct Votes {
    /// The contested root.
    pub id: Root,
    /// Latest vote per representative.
    pub rep_votes: HashMap<Account, (u64, Arc<Block>)>,
}

impl Votes {
    /// Seed with the initially observed block under the placeholder account,
    /// so the tally always has at least one candidate.
    pub fn new(block: Arc<Block>) -> Self {
        let mut rep_votes = HashMap::new();
        rep_votes.insert(Account::ZERO, (0, Arc::clone(&block)));
        Self {
            id: block.root(),
            rep_votes,
        }
    }

    /// Apply a vote. Returns whether the tally changed: a first vote from
    /// this account, or an override that switched blocks.
    pub fn vote(&mut self, vote: &Vote) -> bool {
        match self.rep_votes.entry(vote.account) {
            Entry::Vacant(entry) => {
                entry.insert((vote.sequence, Arc::clone(&vote.block)));
                true
            }
            Entry::Occupied(mut entry) => {
                let (sequence, block) = entry.get_mut();
                if vote.sequence <= *sequence {
                    return false;
                }
                let changed = block.hash() != vote.block.hash();
                *sequence = vote.sequence;
                *block = Arc::clone(&vote.block);
                changed
            }
        }
    }

    /// Snapshot of `(account, block)` pairs for tallying.
    pub fn pairs(&self) -> Vec<(Account, Arc<Block>)> {
        self.rep_votes
            .iter()
            .map(|(account, (_, block))| (*account, Arc::clone(block)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_crypto::{derive_account, keypair_from_seed};
    use lattice_ledger::SendBlock;
    use lattice_types::{Amount, BlockHash, KeyPair, Signature};

    fn block(byte: u8) -> Arc<Block> {
        Arc::new(Block::Send(SendBlock {
            previous: BlockHash::new([1u8; 32]),
            destination: Account::new([byte; 32]),
            balance: Amount::new(5),
            work: 0,
            signature: Signature::ZERO,
        }))
    }

    fn voter(seed: u8) -> KeyPair {
        keypair_from_seed(&[seed; 32])
    }

    fn vote(key: &KeyPair, sequence: u64, block: Arc<Block>) -> Vote {
        Vote::new(derive_account(&key.public), &key.private, sequence, block)
    }

    #[test]
    fn seeded_with_initial_block() {
        let b = block(1);
        let votes = Votes::new(Arc::clone(&b));
        assert_eq!(votes.id, b.root());
        assert_eq!(votes.rep_votes.len(), 1);
        assert!(votes.rep_votes.contains_key(&Account::ZERO));
    }

    #[test]
    fn first_vote_changes_tally() {
        let mut votes = Votes::new(block(1));
        let key = voter(10);
        assert!(votes.vote(&vote(&key, 1, block(2))));
        assert_eq!(votes.rep_votes.len(), 2);
    }

    #[test]
    fn equal_or_lower_sequence_ignored() {
        let mut votes = Votes::new(block(1));
        let key = voter(10);
        votes.vote(&vote(&key, 5, block(2)));
        assert!(!votes.vote(&vote(&key, 5, block(3))));
        assert!(!votes.vote(&vote(&key, 4, block(3))));
        let (sequence, voted) = &votes.rep_votes[&derive_account(&key.public)];
        assert_eq!(*sequence, 5);
        assert_eq!(voted.hash(), block(2).hash());
    }

    #[test]
    fn higher_sequence_overrides() {
        let mut votes = Votes::new(block(1));
        let key = voter(10);
        votes.vote(&vote(&key, 1, block(2)));
        assert!(votes.vote(&vote(&key, 2, block(3))));
        let (sequence, voted) = &votes.rep_votes[&derive_account(&key.public)];
        assert_eq!(*sequence, 2);
        assert_eq!(voted.hash(), block(3).hash());
    }

    #[test]
    fn same_block_higher_sequence_is_unchanged() {
        let mut votes = Votes::new(block(1));
        let key = voter(10);
        votes.vote(&vote(&key, 1, block(2)));
        // Sequence advances but the tally is unaffected
        assert!(!votes.vote(&vote(&key, 2, block(2))));
        assert_eq!(votes.rep_votes[&derive_account(&key.public)].0, 2);
    }
}

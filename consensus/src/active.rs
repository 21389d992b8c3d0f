//! The active-transactions table: one election per conflicting root.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use lattice_ledger::{Block, Ledger};
use lattice_types::Root;

use crate::election::{ConfirmationAction, Election};
use crate::vote::Vote;

/// How many conflicts are announced per round; the remainder have their
/// counters reset (DoS rate-limit — a flood of forks resolves in increasing
/// root order).
pub const ANNOUNCEMENTS_PER_INTERVAL: usize = 16;

/// After this many contiguous announcement rounds an election is
/// force-confirmed and dropped.
pub const CONTIGUOUS_ANNOUNCEMENTS: u32 = 8;

/// An election plus the number of announcement rounds it has survived.
struct ConflictInfo {
    election: Arc<Mutex<Election>>,
    announcements: u32,
}

/// All ongoing elections, keyed by root. The `BTreeMap` keeps announcement
/// order equal to root order. The table mutex is never held while an
/// election touches the ledger; elections are locked individually.
#[derive(Default)]
pub struct ActiveTransactions {
    roots: Mutex<BTreeMap<Root, ConflictInfo>>,
}

impl ActiveTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an election rooted at `block.root()` unless one already exists.
    /// Returns whether a new election was created.
    pub fn start(&self, block: Arc<Block>, confirmation_action: ConfirmationAction) -> bool {
        let root = block.root();
        let mut roots = self.roots.lock().expect("active lock poisoned");
        if roots.contains_key(&root) {
            return false;
        }
        tracing::debug!(%root, block = %block.hash(), "election started");
        roots.insert(
            root,
            ConflictInfo {
                election: Arc::new(Mutex::new(Election::new(block, confirmation_action))),
                announcements: 0,
            },
        );
        true
    }

    /// Route a vote to the election matching the voted block's root, if any.
    pub fn vote(&self, vote: &Vote, ledger: &Ledger) {
        let election = {
            let roots = self.roots.lock().expect("active lock poisoned");
            roots
                .get(&vote.block.root())
                .map(|info| Arc::clone(&info.election))
        };
        if let Some(election) = election {
            election.lock().expect("election lock poisoned").vote(vote, ledger);
        }
    }

    /// One announcement round: walk up to [`ANNOUNCEMENTS_PER_INTERVAL`]
    /// conflicts in root order. For each, locally held representatives vote
    /// for the current winner (`local_votes`), the recomputed winner is
    /// handed to `broadcast`, and elections past the announcement cap are
    /// force-confirmed and erased. Conflicts beyond the batch have their
    /// announcement counters reset.
    pub fn announce_round(
        &self,
        ledger: &Ledger,
        local_votes: impl Fn(&Arc<Block>, u64) -> Vec<Vote>,
        mut broadcast: impl FnMut(Arc<Block>, u64),
    ) {
        // Pick the batch under the table lock, then run elections outside it.
        let (batch, cutoff_roots) = {
            let mut roots = self.roots.lock().expect("active lock poisoned");
            let mut batch = Vec::new();
            let mut cutoff_roots = Vec::new();
            for (root, info) in roots.iter_mut() {
                if batch.len() < ANNOUNCEMENTS_PER_INTERVAL {
                    if info.announcements >= CONTIGUOUS_ANNOUNCEMENTS - 1 {
                        cutoff_roots.push(*root);
                    } else {
                        info.announcements += 1;
                    }
                    batch.push(Arc::clone(&info.election));
                } else {
                    info.announcements = 0;
                }
            }
            (batch, cutoff_roots)
        };

        for election in &batch {
            let mut election = election.lock().expect("election lock poisoned");
            election.sequence += 1;
            let sequence = election.sequence;
            for vote in local_votes(&election.last_winner, sequence) {
                election.vote(&vote, ledger);
            }
            let winner = {
                let txn = ledger.store().tx_begin_read();
                ledger
                    .winner(&txn, &election.votes.pairs())
                    .map(|(_, block)| block)
            };
            if let Some(winner) = winner {
                broadcast(winner, sequence);
            }
        }

        let mut roots = self.roots.lock().expect("active lock poisoned");
        for root in &cutoff_roots {
            if let Some(info) = roots.remove(root) {
                info.election
                    .lock()
                    .expect("election lock poisoned")
                    .confirm_cutoff();
            }
        }
    }

    pub fn exists(&self, root: &Root) -> bool {
        self.roots
            .lock()
            .expect("active lock poisoned")
            .contains_key(root)
    }

    pub fn election(&self, root: &Root) -> Option<Arc<Mutex<Election>>> {
        self.roots
            .lock()
            .expect("active lock poisoned")
            .get(root)
            .map(|info| Arc::clone(&info.election))
    }

    pub fn len(&self) -> usize {
        self.roots.lock().expect("active lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.roots.lock().expect("active lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_crypto::{derive_account, keypair_from_seed};
    use lattice_ledger::SendBlock;
    use lattice_store::MemStore;
    use lattice_types::{Account, Amount, BlockHash, Signature};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ledger() -> Ledger {
        let genesis_key = keypair_from_seed(&[0x47; 32]);
        let ledger = Ledger::new(
            Arc::new(MemStore::new()),
            derive_account(&genesis_key.public),
            Amount::new(1_000_000),
            Amount::ZERO,
        );
        ledger.initialize();
        ledger
    }

    fn block(previous: u8, destination: u8) -> Arc<Block> {
        Arc::new(Block::Send(SendBlock {
            previous: BlockHash::new([previous; 32]),
            destination: Account::new([destination; 32]),
            balance: Amount::new(1),
            work: 0,
            signature: Signature::ZERO,
        }))
    }

    fn noop() -> ConfirmationAction {
        Box::new(|_| {})
    }

    #[test]
    fn one_election_per_root() {
        let active = ActiveTransactions::new();
        let b1 = block(1, 2);
        let b2 = block(1, 3); // same root, different content
        assert!(active.start(Arc::clone(&b1), noop()));
        assert!(!active.start(Arc::clone(&b2), noop()));
        assert_eq!(active.len(), 1);
        assert!(active.exists(&b1.root()));
        // The first block seeds the election
        let election = active.election(&b1.root()).unwrap();
        assert_eq!(election.lock().unwrap().last_winner.hash(), b1.hash());
    }

    #[test]
    fn vote_routed_by_root() {
        let ledger = ledger();
        let active = ActiveTransactions::new();
        let b1 = block(1, 2);
        active.start(Arc::clone(&b1), noop());

        let key = keypair_from_seed(&[9u8; 32]);
        let vote = Vote::new(
            derive_account(&key.public),
            &key.private,
            1,
            Arc::clone(&b1),
        );
        active.vote(&vote, &ledger);
        let election = active.election(&b1.root()).unwrap();
        assert!(election
            .lock()
            .unwrap()
            .votes
            .rep_votes
            .contains_key(&derive_account(&key.public)));

        // A vote for an unknown root is dropped silently
        let other = Vote::new(derive_account(&key.public), &key.private, 1, block(7, 2));
        active.vote(&other, &ledger);
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn announcement_cap_erases_and_confirms_once() {
        let ledger = ledger();
        let active = ActiveTransactions::new();
        let b1 = block(1, 2);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_l = Arc::clone(&counter);
        active.start(
            Arc::clone(&b1),
            Box::new(move |_| {
                counter_l.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let no_votes = |_: &Arc<Block>, _: u64| Vec::new();
        for round in 0..CONTIGUOUS_ANNOUNCEMENTS {
            assert!(active.exists(&b1.root()), "gone after round {round}");
            active.announce_round(&ledger, no_votes, |_, _| {});
        }
        assert!(!active.exists(&b1.root()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Further rounds are no-ops
        active.announce_round(&ledger, no_votes, |_, _| {});
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn announcements_walk_in_root_order() {
        let ledger = ledger();
        let active = ActiveTransactions::new();
        let low = block(1, 2);
        let high = block(9, 2);
        active.start(Arc::clone(&high), noop());
        active.start(Arc::clone(&low), noop());

        let mut order = Vec::new();
        active.announce_round(
            &ledger,
            |_: &Arc<Block>, _| Vec::new(),
            |winner, _| order.push(winner.root()),
        );
        assert_eq!(order, vec![low.root(), high.root()]);
    }

    #[test]
    fn overflow_conflicts_get_counters_reset() {
        let ledger = ledger();
        let active = ActiveTransactions::new();
        // One more conflict than fits in a round
        for i in 0..=ANNOUNCEMENTS_PER_INTERVAL as u8 {
            active.start(block(i + 1, 2), noop());
        }
        assert_eq!(active.len(), ANNOUNCEMENTS_PER_INTERVAL + 1);

        let no_votes = |_: &Arc<Block>, _: u64| Vec::new();
        let mut announced = 0;
        active.announce_round(&ledger, no_votes, |_, _| announced += 1);
        assert_eq!(announced, ANNOUNCEMENTS_PER_INTERVAL);
        // Nothing erased on the first round
        assert_eq!(active.len(), ANNOUNCEMENTS_PER_INTERVAL + 1);
    }
}

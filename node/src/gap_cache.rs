//! The gap cache.
//!
//! Parks blocks whose `previous` or `source` has not arrived yet, keyed by
//! the missing dependency, so they can be re-processed the moment it lands.
//! Each entry tallies votes it observes; once a missing block accumulates
//! more than ~0.4% of supply in vote weight it is almost certainly real but
//! absent because of a hole in our history, and bootstrap is triggered.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lattice_consensus::{Vote, Votes};
use lattice_ledger::{Block, Ledger};
use lattice_network::Scheduler;
use lattice_store::StoreRead;
use lattice_types::{Amount, BlockHash, Timestamp};

use crate::bootstrap::BootstrapInitiator;

/// Upper bound on cached orphans; the oldest arrival is evicted beyond it.
pub const MAX_GAP: usize = 256;

struct GapEntry {
    arrival: Timestamp,
    /// Insertion order, disambiguating equal arrival stamps.
    order: u64,
    required: BlockHash,
    votes: Votes,
    block: Arc<Block>,
}

#[derive(Default)]
struct GapState {
    by_hash: HashMap<BlockHash, GapEntry>,
    by_arrival: BTreeSet<(Timestamp, u64, BlockHash)>,
    by_required: HashMap<BlockHash, Vec<BlockHash>>,
    counter: u64,
}

impl GapState {
    fn remove(&mut self, hash: &BlockHash) -> Option<GapEntry> {
        let entry = self.by_hash.remove(hash)?;
        self.by_arrival.remove(&(entry.arrival, entry.order, *hash));
        if let Some(waiting) = self.by_required.get_mut(&entry.required) {
            waiting.retain(|h| h != hash);
            if waiting.is_empty() {
                self.by_required.remove(&entry.required);
            }
        }
        Some(entry)
    }
}

/// Orphan blocks waiting for a missing dependency, bounded LRU by arrival.
pub struct GapCache {
    state: Mutex<GapState>,
    max: usize,
}

impl Default for GapCache {
    fn default() -> Self {
        Self::new(MAX_GAP)
    }
}

impl GapCache {
    pub fn new(max: usize) -> Self {
        Self {
            state: Mutex::new(GapState::default()),
            max,
        }
    }

    /// Park `block` until `needed` arrives. Re-adding a cached block only
    /// refreshes its arrival stamp.
    pub fn add(&self, block: &Arc<Block>, needed: BlockHash, now: Timestamp) {
        let hash = block.hash();
        let mut guard = self.state.lock().expect("gap cache lock poisoned");
        let state = &mut *guard;
        let order = state.counter;
        state.counter += 1;
        if let Some(entry) = state.by_hash.get_mut(&hash) {
            let stale = (entry.arrival, entry.order, hash);
            entry.arrival = now;
            entry.order = order;
            let fresh = (entry.arrival, entry.order, hash);
            state.by_arrival.remove(&stale);
            state.by_arrival.insert(fresh);
            return;
        }
        state.by_hash.insert(
            hash,
            GapEntry {
                arrival: now,
                order,
                required: needed,
                votes: Votes::new(Arc::clone(block)),
                block: Arc::clone(block),
            },
        );
        state.by_arrival.insert((now, order, hash));
        state.by_required.entry(needed).or_default().push(hash);
        if state.by_hash.len() > self.max {
            if let Some(&(_, _, oldest)) = state.by_arrival.iter().next() {
                state.remove(&oldest);
            }
        }
    }

    /// Drain and return every block that was waiting for `hash`.
    pub fn get(&self, hash: &BlockHash) -> Vec<Arc<Block>> {
        let mut state = self.state.lock().expect("gap cache lock poisoned");
        let Some(waiting) = state.by_required.remove(hash) else {
            return Vec::new();
        };
        waiting
            .iter()
            .filter_map(|waiting_hash| {
                let entry = state.by_hash.remove(waiting_hash)?;
                state
                    .by_arrival
                    .remove(&(entry.arrival, entry.order, *waiting_hash));
                Some(entry.block)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("gap cache lock poisoned").by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Weight above which a missing block triggers bootstrap.
    pub fn bootstrap_threshold(
        &self,
        txn: &impl StoreRead,
        ledger: &Ledger,
        fraction_numerator: u32,
    ) -> Amount {
        Amount::new((ledger.supply(txn).raw() / 256) * fraction_numerator as u128)
    }

    /// Record a vote for a cached block. If the tally changed and the winner
    /// now exceeds the bootstrap threshold, schedule a check after `delay`:
    /// if the block is still absent locally, bootstrap is initiated.
    #[allow(clippy::too_many_arguments)]
    pub fn vote(
        &self,
        txn: &impl StoreRead,
        vote: &Vote,
        ledger: &Arc<Ledger>,
        scheduler: &Scheduler,
        bootstrap: &Arc<dyn BootstrapInitiator>,
        fraction_numerator: u32,
        delay: Duration,
    ) {
        let hash = vote.block.hash();
        let winner_weight = {
            let mut state = self.state.lock().expect("gap cache lock poisoned");
            let Some(entry) = state.by_hash.get_mut(&hash) else {
                return;
            };
            if !entry.votes.vote(vote) {
                return;
            }
            ledger
                .winner(txn, &entry.votes.pairs())
                .map(|(weight, _)| weight)
        };
        let Some(winner_weight) = winner_weight else {
            return;
        };
        if winner_weight > self.bootstrap_threshold(txn, ledger, fraction_numerator) {
            let ledger = Arc::clone(ledger);
            let bootstrap = Arc::clone(bootstrap);
            scheduler(
                delay,
                Box::new(move || {
                    let exists = {
                        let txn = ledger.store().tx_begin_read();
                        txn.block_exists(&hash)
                    };
                    if exists {
                        tracing::debug!(block = %hash, "block was inserted while voting");
                    } else {
                        tracing::warn!(block = %hash, "missing confirmed block");
                        bootstrap.bootstrap_any();
                    }
                }),
            );
        }
    }
}

//! A single election: vote accumulation, winner replacement, one-shot
//! confirmation.

use std::sync::Arc;

use lattice_ledger::{Block, Ledger, ProcessResult};
use lattice_types::Amount;

use crate::vote::Vote;
use crate::votes::Votes;

/// Invoked (at most once per election) with the winning block.
pub type ConfirmationAction = Box<dyn Fn(Arc<Block>) + Send + Sync>;

/// Voting state for one conflicting root.
pub struct Election {
    pub votes: Votes,
    /// The block this node currently considers the winner. Replaced, with a
    /// ledger rollback of the previous value, when a different block crosses
    /// quorum.
    pub last_winner: Arc<Block>,
    /// Announcement sequence, carried in outgoing confirm_acks.
    pub sequence: u64,
    confirmed: bool,
    confirmation_action: ConfirmationAction,
}

impl Election {
    pub fn new(block: Arc<Block>, confirmation_action: ConfirmationAction) -> Self {
        Self {
            votes: Votes::new(Arc::clone(&block)),
            last_winner: block,
            sequence: 0,
            confirmed: false,
            confirmation_action,
        }
    }

    pub fn confirmed(&self) -> bool {
        self.confirmed
    }

    /// Apply a vote; on a tally change, re-check quorum.
    pub fn vote(&mut self, vote: &Vote, ledger: &Ledger) {
        if self.votes.vote(vote) {
            self.confirm_if_quorum(ledger);
        }
    }

    /// Recompute the winner under a write transaction and confirm when a
    /// single candidate holds quorum.
    pub fn confirm_if_quorum(&mut self, ledger: &Ledger) {
        if self.recalculate_winner(ledger) {
            self.confirm_once();
        }
    }

    /// Tally the votes; if a different block than `last_winner` holds more
    /// than half the supply, roll back `last_winner` and adopt it. Returns
    /// whether quorum was reached by a lone candidate.
    fn recalculate_winner(&mut self, ledger: &Ledger) -> bool {
        let mut txn = ledger.store().tx_begin_write();
        let pairs = self.votes.pairs();
        let tally = ledger.tally(&txn, &pairs);
        let threshold = quorum_threshold(ledger.supply(&txn));
        if let Some((weight, block)) = tally.first() {
            if block.hash() != self.last_winner.hash() && *weight > threshold {
                ledger.rollback(&mut txn, self.last_winner.hash());
                let outcome = ledger.process(&mut txn, block);
                if outcome.result != ProcessResult::Progress {
                    tracing::warn!(
                        block = %block.hash(),
                        result = ?outcome.result,
                        "winner replacement did not apply cleanly"
                    );
                }
                self.last_winner = Arc::clone(block);
            }
        }
        tally.len() == 1 && tally[0].0 > threshold
    }

    /// Latch confirmation; the first caller fires the confirmation action.
    pub fn confirm_once(&mut self) {
        if !self.confirmed {
            self.confirmed = true;
            (self.confirmation_action)(Arc::clone(&self.last_winner));
        }
    }

    /// Forced confirmation after the announcement cap: best-effort finality
    /// on whatever the current winner is.
    pub fn confirm_cutoff(&mut self) {
        self.confirm_once();
    }
}

/// Quorum: more than half of the effective supply.
pub fn quorum_threshold(supply: Amount) -> Amount {
    Amount::new(supply.raw() / 2)
}

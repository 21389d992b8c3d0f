//! The block processor.
//!
//! Drives `ledger.process` for incoming blocks inside a single write
//! transaction, republishing anything that progressed, parking orphans in
//! the gap cache, and starting elections on forks. Blocks released by the
//! gap cache are chained onto the same transaction, parents before
//! children.

use std::sync::Arc;

use lattice_consensus::ActiveTransactions;
use lattice_ledger::{Block, Ledger, ProcessOutcome, ProcessResult};
use lattice_network::Gossip;
use lattice_store::{StoreRead, WriteTransaction};
use lattice_types::Timestamp;
use lattice_work::work_value;

use crate::config::Logging;
use crate::gap_cache::GapCache;
use crate::observers::Observers;

/// Ingests blocks into the ledger and fans results out.
pub struct BlockProcessor {
    ledger: Arc<Ledger>,
    gap_cache: Arc<GapCache>,
    active: Arc<ActiveTransactions>,
    gossip: Arc<Gossip>,
    observers: Arc<Observers>,
    logging: Logging,
}

impl BlockProcessor {
    pub fn new(
        ledger: Arc<Ledger>,
        gap_cache: Arc<GapCache>,
        active: Arc<ActiveTransactions>,
        gossip: Arc<Gossip>,
        observers: Arc<Observers>,
        logging: Logging,
    ) -> Self {
        Self {
            ledger,
            gap_cache,
            active,
            gossip,
            observers,
            logging,
        }
    }

    /// Process `incoming` and everything the gap cache releases behind it,
    /// within one write transaction. Progressed blocks are republished with
    /// `rebroadcast` re-transmissions; block observers run after the
    /// transaction closes.
    pub fn process_receive_republish(&self, incoming: Arc<Block>, rebroadcast: u32) {
        let mut completed: Vec<(ProcessOutcome, Arc<Block>)> = Vec::new();
        {
            let mut txn = self.ledger.store().tx_begin_write();
            let mut blocks = vec![incoming];
            while let Some(block) = blocks.pop() {
                let hash = block.hash();
                let outcome = self.process_receive_one(&mut txn, &block);
                if outcome.result == ProcessResult::Progress {
                    self.gossip.republish_block(&block, rebroadcast);
                    completed.push((outcome, block));
                }
                blocks.extend(self.gap_cache.get(&hash));
            }
        }
        for (outcome, block) in completed {
            self.observers
                .call_blocks(&block, &outcome.account, outcome.amount);
        }
    }

    /// Apply one block and its result-specific policy.
    pub fn process_receive_one(
        &self,
        txn: &mut WriteTransaction<'_>,
        block: &Arc<Block>,
    ) -> ProcessOutcome {
        let outcome = self.ledger.process(txn, block);
        let hash = block.hash();
        match outcome.result {
            ProcessResult::Progress => {
                if self.logging.ledger_logging() {
                    tracing::info!(block = %hash, kind = %block.kind(), "processing block");
                }
            }
            ProcessResult::GapPrevious => {
                if self.logging.ledger_logging() {
                    tracing::info!(block = %hash, "gap previous");
                }
                self.gap_cache.add(block, block.previous(), Timestamp::now());
            }
            ProcessResult::GapSource => {
                if self.logging.ledger_logging() {
                    tracing::info!(block = %hash, "gap source");
                }
                let source = block.source().unwrap_or_default();
                self.gap_cache.add(block, source, Timestamp::now());
            }
            ProcessResult::Old => {
                // Keep whichever variant carries the stronger proof-of-work
                if let Some(existing) = self.ledger.block_get(txn, &hash) {
                    let root = block.root();
                    if work_value(&root, block.work()) > work_value(&root, existing.work()) {
                        if let Some(account) = txn.block_account(&hash) {
                            txn.block_put(hash, block.to_bytes(), account);
                        }
                    }
                }
                if self.logging.ledger_duplicate_logging() {
                    tracing::debug!(block = %hash, "old block");
                }
            }
            ProcessResult::Fork => {
                if self.logging.ledger_logging() {
                    tracing::info!(block = %hash, "fork");
                }
                if let Some(successor) = self.ledger.successor(txn, &block.root()) {
                    self.active.start(
                        Arc::new(successor),
                        Box::new(move |winner| {
                            tracing::info!(block = %winner.hash(), "block confirmed");
                        }),
                    );
                }
            }
            ProcessResult::BadSignature
            | ProcessResult::Overspend
            | ProcessResult::Unreceivable
            | ProcessResult::NotReceiveFromSend
            | ProcessResult::AccountMismatch => {
                if self.logging.ledger_logging() {
                    tracing::info!(block = %hash, result = ?outcome.result, "block rejected");
                }
            }
        }
        outcome
    }
}

//! Ledger processing, rollback, and vote tallying.

use std::collections::HashMap;
use std::sync::Arc;

use lattice_store::{AccountInfo, MemStore, PendingInfo, StoreRead, WriteTransaction};
use lattice_types::{Account, Amount, BlockHash, Root, Signature, Timestamp};

use crate::block::{Block, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock};

/// Outcome code of processing one block. Every code has a distinct local
/// policy in the block processor; none is propagated as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Block was accepted and applied.
    Progress,
    /// The block's `previous` is not in the ledger.
    GapPrevious,
    /// The block's `source` is not in the ledger.
    GapSource,
    /// The block is already in the ledger.
    Old,
    /// Another block already follows this block's root.
    Fork,
    /// Signature does not verify against the chain's account.
    BadSignature,
    /// A send for more than the available balance.
    Overspend,
    /// The source send has no pending entry (already received, or never sent).
    Unreceivable,
    /// The source block is not a send.
    NotReceiveFromSend,
    /// The pending entry names a different destination account.
    AccountMismatch,
}

/// Result of `Ledger::process`: the code plus, on progress, the chain's
/// account and the amount transferred.
#[derive(Clone, Debug)]
pub struct ProcessOutcome {
    pub result: ProcessResult,
    pub account: Account,
    pub amount: Amount,
}

impl ProcessOutcome {
    fn rejected(result: ProcessResult) -> Self {
        Self {
            result,
            account: Account::ZERO,
            amount: Amount::ZERO,
        }
    }
}

/// The account-chain ledger over a transactional store.
pub struct Ledger {
    store: Arc<MemStore>,
    genesis_account: Account,
    genesis_amount: Amount,
    inactive_supply: Amount,
}

impl Ledger {
    pub fn new(
        store: Arc<MemStore>,
        genesis_account: Account,
        genesis_amount: Amount,
        inactive_supply: Amount,
    ) -> Self {
        Self {
            store,
            genesis_account,
            genesis_amount,
            inactive_supply,
        }
    }

    pub fn store(&self) -> &MemStore {
        &self.store
    }

    pub fn genesis_account(&self) -> Account {
        self.genesis_account
    }

    /// The deterministic genesis open block for this ledger's configuration.
    pub fn genesis_block(&self) -> Block {
        Block::Open(OpenBlock {
            source: BlockHash::ZERO,
            representative: self.genesis_account,
            account: self.genesis_account,
            work: 0,
            signature: Signature::ZERO,
        })
    }

    /// Seed an empty store with the genesis block. A non-empty store is left
    /// untouched.
    pub fn initialize(&self) -> Block {
        let genesis = self.genesis_block();
        let hash = genesis.hash();
        let mut txn = self.store.tx_begin_write();
        if txn.account_count() == 0 {
            txn.block_put(hash, genesis.to_bytes(), self.genesis_account);
            txn.successor_put(Root::from(self.genesis_account), hash);
            txn.account_put(
                self.genesis_account,
                AccountInfo {
                    head: hash,
                    representative: self.genesis_account,
                    balance: self.genesis_amount,
                    modified: Timestamp::now(),
                    block_count: 1,
                },
            );
            txn.weight_add(&self.genesis_account, self.genesis_amount);
            tracing::info!(genesis = %hash, "ledger initialized");
        }
        genesis
    }

    /// Process one block inside the given write transaction.
    pub fn process(&self, txn: &mut WriteTransaction<'_>, block: &Block) -> ProcessOutcome {
        let hash = block.hash();
        if txn.block_exists(&hash) {
            return ProcessOutcome::rejected(ProcessResult::Old);
        }
        match block {
            Block::Send(b) => self.process_send(txn, block, b, hash),
            Block::Receive(b) => self.process_receive(txn, block, b, hash),
            Block::Open(b) => self.process_open(txn, block, b, hash),
            Block::Change(b) => self.process_change(txn, block, b, hash),
        }
    }

    fn process_send(
        &self,
        txn: &mut WriteTransaction<'_>,
        block: &Block,
        b: &SendBlock,
        hash: BlockHash,
    ) -> ProcessOutcome {
        let Some(account) = txn.block_account(&b.previous) else {
            return ProcessOutcome::rejected(ProcessResult::GapPrevious);
        };
        if !block.verify(&account) {
            return ProcessOutcome::rejected(ProcessResult::BadSignature);
        }
        let Some(info) = txn.account_get(&account) else {
            return ProcessOutcome::rejected(ProcessResult::GapPrevious);
        };
        if info.head != b.previous {
            return ProcessOutcome::rejected(ProcessResult::Fork);
        }
        let Some(amount) = info.balance.checked_sub(b.balance) else {
            return ProcessOutcome::rejected(ProcessResult::Overspend);
        };
        txn.block_put(hash, block.to_bytes(), account);
        txn.successor_put(Root::from(b.previous), hash);
        txn.account_put(
            account,
            AccountInfo {
                head: hash,
                representative: info.representative,
                balance: b.balance,
                modified: Timestamp::now(),
                block_count: info.block_count + 1,
            },
        );
        txn.weight_sub(&info.representative, amount);
        txn.pending_put(
            hash,
            PendingInfo {
                source: account,
                amount,
                destination: b.destination,
            },
        );
        ProcessOutcome {
            result: ProcessResult::Progress,
            account,
            amount,
        }
    }

    fn process_receive(
        &self,
        txn: &mut WriteTransaction<'_>,
        block: &Block,
        b: &ReceiveBlock,
        hash: BlockHash,
    ) -> ProcessOutcome {
        let Some(account) = txn.block_account(&b.previous) else {
            return ProcessOutcome::rejected(ProcessResult::GapPrevious);
        };
        let Some(source_block) = self.block_get(txn, &b.source) else {
            return ProcessOutcome::rejected(ProcessResult::GapSource);
        };
        if !matches!(source_block, Block::Send(_)) {
            return ProcessOutcome::rejected(ProcessResult::NotReceiveFromSend);
        }
        if !block.verify(&account) {
            return ProcessOutcome::rejected(ProcessResult::BadSignature);
        }
        let Some(info) = txn.account_get(&account) else {
            return ProcessOutcome::rejected(ProcessResult::GapPrevious);
        };
        if info.head != b.previous {
            return ProcessOutcome::rejected(ProcessResult::Fork);
        }
        let Some(pending) = txn.pending_get(&b.source) else {
            return ProcessOutcome::rejected(ProcessResult::Unreceivable);
        };
        if pending.destination != account {
            return ProcessOutcome::rejected(ProcessResult::AccountMismatch);
        }
        let amount = pending.amount;
        txn.pending_del(&b.source);
        txn.block_put(hash, block.to_bytes(), account);
        txn.successor_put(Root::from(b.previous), hash);
        txn.account_put(
            account,
            AccountInfo {
                head: hash,
                representative: info.representative,
                balance: info.balance.saturating_add(amount),
                modified: Timestamp::now(),
                block_count: info.block_count + 1,
            },
        );
        txn.weight_add(&info.representative, amount);
        ProcessOutcome {
            result: ProcessResult::Progress,
            account,
            amount,
        }
    }

    fn process_open(
        &self,
        txn: &mut WriteTransaction<'_>,
        block: &Block,
        b: &OpenBlock,
        hash: BlockHash,
    ) -> ProcessOutcome {
        let Some(source_block) = self.block_get(txn, &b.source) else {
            return ProcessOutcome::rejected(ProcessResult::GapSource);
        };
        if !matches!(source_block, Block::Send(_)) {
            return ProcessOutcome::rejected(ProcessResult::NotReceiveFromSend);
        }
        if !block.verify(&b.account) {
            return ProcessOutcome::rejected(ProcessResult::BadSignature);
        }
        if txn.account_get(&b.account).is_some() {
            return ProcessOutcome::rejected(ProcessResult::Fork);
        }
        let Some(pending) = txn.pending_get(&b.source) else {
            return ProcessOutcome::rejected(ProcessResult::Unreceivable);
        };
        if pending.destination != b.account {
            return ProcessOutcome::rejected(ProcessResult::AccountMismatch);
        }
        let amount = pending.amount;
        txn.pending_del(&b.source);
        txn.block_put(hash, block.to_bytes(), b.account);
        txn.successor_put(Root::from(b.account), hash);
        txn.account_put(
            b.account,
            AccountInfo {
                head: hash,
                representative: b.representative,
                balance: amount,
                modified: Timestamp::now(),
                block_count: 1,
            },
        );
        txn.weight_add(&b.representative, amount);
        ProcessOutcome {
            result: ProcessResult::Progress,
            account: b.account,
            amount,
        }
    }

    fn process_change(
        &self,
        txn: &mut WriteTransaction<'_>,
        block: &Block,
        b: &ChangeBlock,
        hash: BlockHash,
    ) -> ProcessOutcome {
        let Some(account) = txn.block_account(&b.previous) else {
            return ProcessOutcome::rejected(ProcessResult::GapPrevious);
        };
        if !block.verify(&account) {
            return ProcessOutcome::rejected(ProcessResult::BadSignature);
        }
        let Some(info) = txn.account_get(&account) else {
            return ProcessOutcome::rejected(ProcessResult::GapPrevious);
        };
        if info.head != b.previous {
            return ProcessOutcome::rejected(ProcessResult::Fork);
        }
        txn.weight_sub(&info.representative, info.balance);
        txn.weight_add(&b.representative, info.balance);
        txn.block_put(hash, block.to_bytes(), account);
        txn.successor_put(Root::from(b.previous), hash);
        txn.account_put(
            account,
            AccountInfo {
                head: hash,
                representative: b.representative,
                balance: info.balance,
                modified: Timestamp::now(),
                block_count: info.block_count + 1,
            },
        );
        ProcessOutcome {
            result: ProcessResult::Progress,
            account,
            amount: Amount::ZERO,
        }
    }

    /// Remove `target` and every block above it on its account chain,
    /// restoring balances, weights, and pending entries. Receives that
    /// consumed a rolled-back send unwind the receiving chain first.
    pub fn rollback(&self, txn: &mut WriteTransaction<'_>, target: BlockHash) {
        let Some(account) = txn.block_account(&target) else {
            return;
        };
        while txn.block_exists(&target) {
            let Some(info) = txn.account_get(&account) else {
                break;
            };
            self.rollback_one(txn, info.head);
        }
    }

    fn rollback_one(&self, txn: &mut WriteTransaction<'_>, hash: BlockHash) {
        let Some(block) = self.block_get(txn, &hash) else {
            return;
        };
        let Some(account) = txn.block_account(&hash) else {
            return;
        };
        match &block {
            Block::Send(b) => {
                while txn.pending_get(&hash).is_none() {
                    let Some(latest) = self.latest(txn, &b.destination) else {
                        break;
                    };
                    self.rollback(txn, latest);
                }
                txn.pending_del(&hash);
                let Some(info) = txn.account_get(&account) else {
                    return;
                };
                let balance = self.balance_of(txn, &b.previous);
                let amount = balance.saturating_sub(b.balance);
                txn.weight_add(&info.representative, amount);
                txn.account_put(
                    account,
                    AccountInfo {
                        head: b.previous,
                        representative: info.representative,
                        balance,
                        modified: Timestamp::now(),
                        block_count: info.block_count.saturating_sub(1),
                    },
                );
                txn.block_del(&hash);
                txn.successor_del(&Root::from(b.previous));
            }
            Block::Receive(b) => {
                let Some(info) = txn.account_get(&account) else {
                    return;
                };
                let amount = self.amount_of(txn, &b.source);
                let source_account = txn.block_account(&b.source).unwrap_or_default();
                txn.pending_put(
                    b.source,
                    PendingInfo {
                        source: source_account,
                        amount,
                        destination: account,
                    },
                );
                txn.weight_sub(&info.representative, amount);
                txn.account_put(
                    account,
                    AccountInfo {
                        head: b.previous,
                        representative: info.representative,
                        balance: info.balance.saturating_sub(amount),
                        modified: Timestamp::now(),
                        block_count: info.block_count.saturating_sub(1),
                    },
                );
                txn.block_del(&hash);
                txn.successor_del(&Root::from(b.previous));
            }
            Block::Open(b) => {
                let amount = self.amount_of(txn, &b.source);
                let source_account = txn.block_account(&b.source).unwrap_or_default();
                txn.pending_put(
                    b.source,
                    PendingInfo {
                        source: source_account,
                        amount,
                        destination: account,
                    },
                );
                txn.weight_sub(&b.representative, amount);
                txn.account_del(&account);
                txn.block_del(&hash);
                txn.successor_del(&Root::from(b.account));
            }
            Block::Change(b) => {
                let Some(info) = txn.account_get(&account) else {
                    return;
                };
                txn.weight_sub(&b.representative, info.balance);
                let previous_rep = self.representative_of(txn, &b.previous);
                txn.weight_add(&previous_rep, info.balance);
                txn.account_put(
                    account,
                    AccountInfo {
                        head: b.previous,
                        representative: previous_rep,
                        balance: info.balance,
                        modified: Timestamp::now(),
                        block_count: info.block_count.saturating_sub(1),
                    },
                );
                txn.block_del(&hash);
                txn.successor_del(&Root::from(b.previous));
            }
        }
        tracing::debug!(block = %hash, kind = %block.kind(), "rolled back");
    }

    /// Sum voting weight per candidate block, heaviest first. Candidates
    /// whose accumulated weight is zero are omitted.
    pub fn tally(
        &self,
        txn: &impl StoreRead,
        rep_votes: &[(Account, Arc<Block>)],
    ) -> Vec<(Amount, Arc<Block>)> {
        let mut totals: HashMap<BlockHash, (Amount, Arc<Block>)> = HashMap::new();
        for (account, block) in rep_votes {
            let weight = self.weight(txn, account);
            let entry = totals
                .entry(block.hash())
                .or_insert_with(|| (Amount::ZERO, Arc::clone(block)));
            entry.0 = entry.0.saturating_add(weight);
        }
        let mut list: Vec<(Amount, Arc<Block>)> = totals
            .into_values()
            .filter(|(weight, _)| !weight.is_zero())
            .collect();
        list.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.hash().cmp(&b.1.hash())));
        list
    }

    /// The heaviest candidate. Falls back to the first vote with zero weight
    /// when no voter carries any.
    pub fn winner(
        &self,
        txn: &impl StoreRead,
        rep_votes: &[(Account, Arc<Block>)],
    ) -> Option<(Amount, Arc<Block>)> {
        self.tally(txn, rep_votes)
            .into_iter()
            .next()
            .or_else(|| rep_votes.first().map(|(_, b)| (Amount::ZERO, Arc::clone(b))))
    }

    /// Effective supply: genesis amount minus the configured inactive supply.
    pub fn supply(&self, _txn: &impl StoreRead) -> Amount {
        self.genesis_amount.saturating_sub(self.inactive_supply)
    }

    /// Voting weight delegated to `account`.
    pub fn weight(&self, txn: &impl StoreRead, account: &Account) -> Amount {
        txn.weight_get(account)
    }

    /// The locally accepted block following `root`, if any.
    pub fn successor(&self, txn: &impl StoreRead, root: &Root) -> Option<Block> {
        let hash = txn.successor_get(root)?;
        self.block_get(txn, &hash)
    }

    /// Head block hash of `account`'s chain.
    pub fn latest(&self, txn: &impl StoreRead, account: &Account) -> Option<BlockHash> {
        txn.account_get(account).map(|info| info.head)
    }

    pub fn account_balance(&self, txn: &impl StoreRead, account: &Account) -> Amount {
        txn.account_get(account)
            .map(|info| info.balance)
            .unwrap_or(Amount::ZERO)
    }

    pub fn block_get(&self, txn: &impl StoreRead, hash: &BlockHash) -> Option<Block> {
        txn.block_get(hash).and_then(|bytes| Block::from_bytes(&bytes))
    }

    pub fn block_exists(&self, txn: &impl StoreRead, hash: &BlockHash) -> bool {
        txn.block_exists(hash)
    }

    /// Balance of the chain immediately after `hash`.
    fn balance_of(&self, txn: &impl StoreRead, hash: &BlockHash) -> Amount {
        match self.block_get(txn, hash) {
            Some(Block::Send(b)) => b.balance,
            Some(Block::Receive(b)) => self
                .balance_of(txn, &b.previous)
                .saturating_add(self.amount_of(txn, &b.source)),
            Some(Block::Open(b)) => {
                if b.source.is_zero() {
                    self.genesis_amount
                } else {
                    self.amount_of(txn, &b.source)
                }
            }
            Some(Block::Change(b)) => self.balance_of(txn, &b.previous),
            None => Amount::ZERO,
        }
    }

    /// Amount transferred by the send block `hash`.
    fn amount_of(&self, txn: &impl StoreRead, hash: &BlockHash) -> Amount {
        match self.block_get(txn, hash) {
            Some(Block::Send(b)) => self
                .balance_of(txn, &b.previous)
                .saturating_sub(b.balance),
            _ => Amount::ZERO,
        }
    }

    /// Representative in effect after `hash` on its chain.
    fn representative_of(&self, txn: &impl StoreRead, hash: &BlockHash) -> Account {
        let mut current = *hash;
        loop {
            match self.block_get(txn, &current) {
                Some(Block::Open(b)) => return b.representative,
                Some(Block::Change(b)) => return b.representative,
                Some(other) => current = other.previous(),
                None => return Account::ZERO,
            }
        }
    }
}

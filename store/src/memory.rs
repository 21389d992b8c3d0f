//! In-memory store implementation.
//!
//! Blocks are stored as opaque bytes alongside the account that owns them;
//! serialization stays a ledger concern. The successor index maps a block's
//! root to the block that follows it, which is how fork elections locate the
//! locally accepted side.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use lattice_types::{Account, Amount, BlockHash, Root};

use crate::{AccountInfo, PendingInfo};

#[derive(Clone)]
struct StoredBlock {
    bytes: Vec<u8>,
    account: Account,
}

#[derive(Default)]
struct StoreInner {
    blocks: HashMap<BlockHash, StoredBlock>,
    successors: HashMap<Root, BlockHash>,
    accounts: HashMap<Account, AccountInfo>,
    pending: HashMap<BlockHash, PendingInfo>,
    representation: HashMap<Account, Amount>,
}

/// The in-memory transactional store.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<StoreInner>,
}

/// Shared read access to the store, held for the duration of a guard.
pub struct ReadTransaction<'a>(RwLockReadGuard<'a, StoreInner>);

/// Exclusive write access to the store. Only one exists at a time.
pub struct WriteTransaction<'a>(RwLockWriteGuard<'a, StoreInner>);

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tx_begin_read(&self) -> ReadTransaction<'_> {
        ReadTransaction(self.inner.read().expect("store lock poisoned"))
    }

    pub fn tx_begin_write(&self) -> WriteTransaction<'_> {
        WriteTransaction(self.inner.write().expect("store lock poisoned"))
    }
}

/// Read operations available under either transaction kind.
pub trait StoreRead {
    fn block_get(&self, hash: &BlockHash) -> Option<Vec<u8>>;
    fn block_account(&self, hash: &BlockHash) -> Option<Account>;
    fn block_count(&self) -> u64;
    fn successor_get(&self, root: &Root) -> Option<BlockHash>;
    fn account_get(&self, account: &Account) -> Option<AccountInfo>;
    fn account_count(&self) -> u64;
    fn pending_get(&self, hash: &BlockHash) -> Option<PendingInfo>;
    fn weight_get(&self, account: &Account) -> Amount;

    fn block_exists(&self, hash: &BlockHash) -> bool {
        self.block_get(hash).is_some()
    }
}

impl StoreInner {
    fn read_block(&self, hash: &BlockHash) -> Option<Vec<u8>> {
        self.blocks.get(hash).map(|b| b.bytes.clone())
    }
}

macro_rules! impl_store_read {
    ($name:ident) => {
        impl StoreRead for $name<'_> {
            fn block_get(&self, hash: &BlockHash) -> Option<Vec<u8>> {
                self.0.read_block(hash)
            }

            fn block_account(&self, hash: &BlockHash) -> Option<Account> {
                self.0.blocks.get(hash).map(|b| b.account)
            }

            fn block_count(&self) -> u64 {
                self.0.blocks.len() as u64
            }

            fn successor_get(&self, root: &Root) -> Option<BlockHash> {
                self.0.successors.get(root).copied()
            }

            fn account_get(&self, account: &Account) -> Option<AccountInfo> {
                self.0.accounts.get(account).cloned()
            }

            fn account_count(&self) -> u64 {
                self.0.accounts.len() as u64
            }

            fn pending_get(&self, hash: &BlockHash) -> Option<PendingInfo> {
                self.0.pending.get(hash).cloned()
            }

            fn weight_get(&self, account: &Account) -> Amount {
                self.0
                    .representation
                    .get(account)
                    .copied()
                    .unwrap_or(Amount::ZERO)
            }
        }
    };
}

impl_store_read!(ReadTransaction);
impl_store_read!(WriteTransaction);

impl WriteTransaction<'_> {
    pub fn block_put(&mut self, hash: BlockHash, bytes: Vec<u8>, account: Account) {
        self.0.blocks.insert(hash, StoredBlock { bytes, account });
    }

    pub fn block_del(&mut self, hash: &BlockHash) {
        self.0.blocks.remove(hash);
    }

    pub fn successor_put(&mut self, root: Root, hash: BlockHash) {
        self.0.successors.insert(root, hash);
    }

    pub fn successor_del(&mut self, root: &Root) {
        self.0.successors.remove(root);
    }

    pub fn account_put(&mut self, account: Account, info: AccountInfo) {
        self.0.accounts.insert(account, info);
    }

    pub fn account_del(&mut self, account: &Account) {
        self.0.accounts.remove(account);
    }

    pub fn pending_put(&mut self, hash: BlockHash, info: PendingInfo) {
        self.0.pending.insert(hash, info);
    }

    pub fn pending_del(&mut self, hash: &BlockHash) {
        self.0.pending.remove(hash);
    }

    pub fn weight_add(&mut self, account: &Account, amount: Amount) {
        let entry = self
            .0
            .representation
            .entry(*account)
            .or_insert(Amount::ZERO);
        *entry = entry.saturating_add(amount);
    }

    pub fn weight_sub(&mut self, account: &Account, amount: Amount) {
        if let Some(entry) = self.0.representation.get_mut(account) {
            *entry = entry.saturating_sub(amount);
            if entry.is_zero() {
                self.0.representation.remove(account);
            }
        }
    }
}

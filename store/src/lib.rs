//! Transactional store for blocks, accounts, pending receivables, and
//! representative weights.
//!
//! The ledger takes a read transaction for inspection and a write transaction
//! for any path that may mutate. Writes are exclusive: at most one write
//! transaction exists at any time, enforced by the `RwLock` backing the
//! in-memory store.

pub mod account;
pub mod memory;
pub mod pending;

pub use account::AccountInfo;
pub use memory::{MemStore, ReadTransaction, StoreRead, WriteTransaction};
pub use pending::PendingInfo;

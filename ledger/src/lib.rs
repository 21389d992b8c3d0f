//! Account-chain ledger.
//!
//! Each account owns an independent chain of blocks; global consistency is
//! only needed where chains conflict (forks), which stake-weighted voting
//! resolves. This crate defines the four block variants and the ledger
//! operations the node core drives: `process`, `rollback`, `tally`/`winner`,
//! `supply`, `weight`, and `successor`.

pub mod block;
pub mod ledger;

pub use block::{Block, BlockKind, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock};
pub use ledger::{Ledger, ProcessOutcome, ProcessResult};

//! Per-account metadata.

use lattice_types::{Account, Amount, BlockHash, Timestamp};
use serde::{Deserialize, Serialize};

/// Head-of-chain metadata for a single account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Hash of the most recent block on the account's chain.
    pub head: BlockHash,
    /// The representative this account delegates its weight to.
    pub representative: Account,
    /// Balance after the head block.
    pub balance: Amount,
    /// When the head block was processed.
    pub modified: Timestamp,
    /// Number of blocks on the chain.
    pub block_count: u64,
}

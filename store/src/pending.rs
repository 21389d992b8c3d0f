//! Pending (receivable) entries, keyed by the send block hash.

use lattice_types::{Account, Amount};
use serde::{Deserialize, Serialize};

/// An amount sent but not yet received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInfo {
    /// The sending account.
    pub source: Account,
    /// The amount in flight.
    pub amount: Amount,
    /// The account entitled to receive it.
    pub destination: Account,
}

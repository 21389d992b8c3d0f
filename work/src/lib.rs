//! Proof-of-work.
//!
//! Every block carries a 64-bit nonce whose work value — the first eight
//! bytes of `Blake2b-256(root ‖ nonce)` — must meet the network threshold.
//! Generation can be local (CPU threads) or distributed across configured
//! work peers, racing their HTTP responses against each other.

pub mod distributed;
pub mod generator;
pub mod validator;

pub use distributed::{WorkError, WorkPool};
pub use generator::WorkGenerator;
pub use validator::{work_validate, work_value};

use lattice_types::NetworkId;

/// Publish threshold for a network. The test network is deliberately easy so
/// unit tests generate work in microseconds.
pub fn network_threshold(network: NetworkId) -> u64 {
    match network {
        NetworkId::Test => 0xff00_0000_0000_0000,
        _ => 0xffff_ffc0_0000_0000,
    }
}

//! The lattice node.
//!
//! Wires the subsystems together: the alarm sequences delayed work against
//! the Tokio executor, the UDP service feeds the dispatch task, the block
//! processor drives the ledger and the gap cache, and the election engine
//! announces winners on its cadence.

pub mod alarm;
pub mod bootstrap;
pub mod config;
pub mod gap_cache;
pub mod logging;
pub mod node;
pub mod observers;
pub mod processor;

mod error;

pub use alarm::Alarm;
pub use bootstrap::{BootstrapInitiator, LogBootstrap};
pub use config::{ConfigError, Logging, NodeConfig, CONFIG_VERSION};
pub use error::NodeError;
pub use gap_cache::{GapCache, MAX_GAP};
pub use logging::{init_logging, LogFormat};
pub use node::Node;
pub use observers::Observers;
pub use processor::BlockProcessor;

use lattice_types::{Account, Amount, KeyPair, NetworkId};

/// Total supply minted into the genesis account.
pub const GENESIS_AMOUNT: Amount = Amount::GENESIS;

/// Seed of the well-known test-network genesis key.
pub const TEST_GENESIS_SEED: [u8; 32] = [0x47; 32];

/// The test-network genesis key pair.
pub fn test_genesis_keypair() -> KeyPair {
    lattice_crypto::keypair_from_seed(&TEST_GENESIS_SEED)
}

/// The genesis account for a network.
pub fn genesis_account(network: NetworkId) -> Account {
    match network {
        NetworkId::Live => Account::decode_hex(
            "2514452A978F08D1CF76BB40B6AD064A7C60903A0C9B5D0EED913B072B224E0C",
        )
        .expect("live genesis constant is valid hex"),
        NetworkId::Beta => Account::decode_hex(
            "9D060E6F94F0B6D1C4D8E7E81D1F5E4E9C02801DA8D6B6889FBA71FE32CD5B4C",
        )
        .expect("beta genesis constant is valid hex"),
        NetworkId::Test => lattice_crypto::derive_account(&test_genesis_keypair().public),
    }
}

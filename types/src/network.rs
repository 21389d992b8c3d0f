//! Network identifier and per-network timing constants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifies which lattice network a node participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkId {
    /// The production network.
    Live,
    /// The public beta network.
    Beta,
    /// The unit-test network (millisecond cadences).
    Test,
}

impl NetworkId {
    /// Default UDP peering port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Live => 7075,
            Self::Beta => 54000,
            Self::Test => 24000,
        }
    }

    /// Network byte carried in every message header.
    pub fn magic(&self) -> u8 {
        match self {
            Self::Live => b'L',
            Self::Beta => b'B',
            Self::Test => b'T',
        }
    }

    /// How often each election announces its current winner.
    pub fn announce_interval(&self) -> Duration {
        match self {
            Self::Test => Duration::from_millis(10),
            _ => Duration::from_secs(16),
        }
    }

    /// Delay before checking whether a heavily-voted gap block arrived,
    /// after which bootstrap is triggered.
    pub fn gap_bootstrap_delay(&self) -> Duration {
        match self {
            Self::Test => Duration::from_millis(10),
            _ => Duration::from_secs(5),
        }
    }

    /// Interval between keepalive rounds.
    pub fn keepalive_period(&self) -> Duration {
        Duration::from_secs(60)
    }

    /// Peers not contacted within this window are purged.
    pub fn peer_cutoff(&self) -> Duration {
        self.keepalive_period() * 5
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Beta => "beta",
            Self::Test => "test",
        }
    }
}

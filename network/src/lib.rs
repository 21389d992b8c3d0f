//! Networking: peer table, UDP transport, and message-level gossip.

pub mod gossip;
pub mod peer_table;
pub mod stats;
pub mod udp;

pub use gossip::Gossip;
pub use peer_table::{PeerInfo, PeerTable};
pub use stats::NetworkStats;
pub use udp::{Scheduler, SendCallback, Task, UdpService};

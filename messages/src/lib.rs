//! P2P wire messages and endpoint handling.
//!
//! Every datagram starts with a four-byte header (protocol magic, network
//! byte, message type) followed by a bincode body. Endpoints on the wire are
//! always IPv6; v4 senders are v4-mapped before any peer-table operation.

pub mod codec;
pub mod endpoint;
pub mod message;

pub use codec::{deserialize_message, serialize_message, MessageError};
pub use endpoint::{
    map_endpoint, mapped_v4, parse_endpoint, parse_port, reserved_address, unspecified_endpoint,
};
pub use message::{ConfirmAck, ConfirmReq, Keepalive, Message, MessageType, Publish, KEEPALIVE_PEERS};

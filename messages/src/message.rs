//! The five wire message types.

use std::net::SocketAddrV6;
use std::sync::Arc;

use lattice_consensus::Vote;
use lattice_ledger::Block;
use serde::{Deserialize, Serialize};

use crate::endpoint::unspecified_endpoint;

/// Number of endpoints attached to a keepalive.
pub const KEEPALIVE_PEERS: usize = 8;

/// Wire message type byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Keepalive = 2,
    Publish = 3,
    ConfirmReq = 4,
    ConfirmAck = 5,
    BulkPull = 6,
    BulkPush = 7,
    FrontierReq = 8,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            2 => Some(Self::Keepalive),
            3 => Some(Self::Publish),
            4 => Some(Self::ConfirmReq),
            5 => Some(Self::ConfirmAck),
            6 => Some(Self::BulkPull),
            7 => Some(Self::BulkPush),
            8 => Some(Self::FrontierReq),
            _ => None,
        }
    }
}

/// Keepalive: eight peer endpoints for gossip, padded with the unspecified
/// address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keepalive {
    pub peers: [SocketAddrV6; KEEPALIVE_PEERS],
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            peers: [unspecified_endpoint(); KEEPALIVE_PEERS],
        }
    }
}

/// Publish: flood one block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Publish {
    pub block: Arc<Block>,
}

/// Confirm request: ask representatives to vote on a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmReq {
    pub block: Arc<Block>,
}

/// Confirm acknowledgment: a signed representative vote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmAck {
    pub vote: Vote,
}

/// A parsed wire message.
///
/// The bulk/frontier types belong to the TCP bootstrap protocol; receiving
/// one over UDP indicates a protocol bug and is fatal in dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Keepalive(Keepalive),
    Publish(Publish),
    ConfirmReq(ConfirmReq),
    ConfirmAck(ConfirmAck),
    BulkPull,
    BulkPush,
    FrontierReq,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Keepalive(_) => MessageType::Keepalive,
            Self::Publish(_) => MessageType::Publish,
            Self::ConfirmReq(_) => MessageType::ConfirmReq,
            Self::ConfirmAck(_) => MessageType::ConfirmAck,
            Self::BulkPull => MessageType::BulkPull,
            Self::BulkPush => MessageType::BulkPush,
            Self::FrontierReq => MessageType::FrontierReq,
        }
    }

    /// The block whose proof-of-work must be checked on ingress, if any.
    pub fn work_checked_block(&self) -> Option<&Arc<Block>> {
        match self {
            Self::Publish(p) => Some(&p.block),
            Self::ConfirmReq(r) => Some(&r.block),
            Self::ConfirmAck(a) => Some(&a.vote.block),
            _ => None,
        }
    }
}

//! Datagram framing: header + bincode body.

use lattice_types::NetworkId;
use thiserror::Error;

use crate::message::{Message, MessageType};

/// Protocol magic, the first byte of every datagram.
pub const MAGIC: u8 = b'X';

/// Wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Header layout: magic, network byte, version, message type.
pub const HEADER_SIZE: usize = 4;

/// Largest datagram we will produce or accept.
pub const MAX_MESSAGE_SIZE: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("datagram shorter than the header")]
    TooShort,
    #[error("bad protocol magic {0:#04x}")]
    BadMagic(u8),
    #[error("message for a different network ({0:#04x})")]
    WrongNetwork(u8),
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("header type byte does not match the body")]
    TypeMismatch,
    #[error("malformed body: {0}")]
    Body(String),
    #[error("message exceeds {MAX_MESSAGE_SIZE} bytes")]
    Oversize,
}

/// Frame `message` for `network`.
pub fn serialize_message(network: NetworkId, message: &Message) -> Result<Vec<u8>, MessageError> {
    let body = bincode::serialize(message).map_err(|e| MessageError::Body(e.to_string()))?;
    if HEADER_SIZE + body.len() > MAX_MESSAGE_SIZE {
        return Err(MessageError::Oversize);
    }
    let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
    bytes.push(MAGIC);
    bytes.push(network.magic());
    bytes.push(PROTOCOL_VERSION);
    bytes.push(message.message_type() as u8);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Parse a datagram for `network`.
pub fn deserialize_message(network: NetworkId, bytes: &[u8]) -> Result<Message, MessageError> {
    if bytes.len() < HEADER_SIZE {
        return Err(MessageError::TooShort);
    }
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(MessageError::Oversize);
    }
    if bytes[0] != MAGIC {
        return Err(MessageError::BadMagic(bytes[0]));
    }
    if bytes[1] != network.magic() {
        return Err(MessageError::WrongNetwork(bytes[1]));
    }
    if bytes[2] != PROTOCOL_VERSION {
        return Err(MessageError::BadVersion(bytes[2]));
    }
    let message_type =
        MessageType::from_byte(bytes[3]).ok_or(MessageError::UnknownType(bytes[3]))?;
    let message: Message = bincode::deserialize(&bytes[HEADER_SIZE..])
        .map_err(|e| MessageError::Body(e.to_string()))?;
    if message.message_type() != message_type {
        return Err(MessageError::TypeMismatch);
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::mapped_v4;
    use crate::message::{ConfirmAck, ConfirmReq, Keepalive, Publish, KEEPALIVE_PEERS};
    use lattice_consensus::Vote;
    use lattice_crypto::{derive_account, keypair_from_seed};
    use lattice_ledger::{Block, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock};
    use lattice_types::{Account, Amount, BlockHash, Signature};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn sample_blocks() -> Vec<Arc<Block>> {
        vec![
            Arc::new(Block::Send(SendBlock {
                previous: BlockHash::new([1u8; 32]),
                destination: Account::new([2u8; 32]),
                balance: Amount::new(42),
                work: 7,
                signature: Signature([0xAA; 64]),
            })),
            Arc::new(Block::Receive(ReceiveBlock {
                previous: BlockHash::new([3u8; 32]),
                source: BlockHash::new([4u8; 32]),
                work: 8,
                signature: Signature([0xBB; 64]),
            })),
            Arc::new(Block::Open(OpenBlock {
                source: BlockHash::new([5u8; 32]),
                representative: Account::new([6u8; 32]),
                account: Account::new([7u8; 32]),
                work: 9,
                signature: Signature([0xCC; 64]),
            })),
            Arc::new(Block::Change(ChangeBlock {
                previous: BlockHash::new([8u8; 32]),
                representative: Account::new([9u8; 32]),
                work: 10,
                signature: Signature([0xDD; 64]),
            })),
        ]
    }

    #[test]
    fn publish_round_trip_every_variant() {
        for block in sample_blocks() {
            let message = Message::Publish(Publish {
                block: Arc::clone(&block),
            });
            let bytes = serialize_message(NetworkId::Test, &message).unwrap();
            let decoded = deserialize_message(NetworkId::Test, &bytes).unwrap();
            match decoded {
                Message::Publish(p) => assert_eq!(*p.block, *block),
                other => panic!("expected Publish, got {other:?}"),
            }
        }
    }

    #[test]
    fn keepalive_round_trip() {
        let mut keepalive = Keepalive::default();
        keepalive.peers[0] = mapped_v4(Ipv4Addr::new(10, 0, 0, 1), 7075);
        keepalive.peers[3] = mapped_v4(Ipv4Addr::new(10, 0, 0, 2), 7076);
        let bytes =
            serialize_message(NetworkId::Test, &Message::Keepalive(keepalive.clone())).unwrap();
        match deserialize_message(NetworkId::Test, &bytes).unwrap() {
            Message::Keepalive(k) => {
                assert_eq!(k, keepalive);
                assert_eq!(k.peers.len(), KEEPALIVE_PEERS);
            }
            other => panic!("expected Keepalive, got {other:?}"),
        }
    }

    #[test]
    fn confirm_req_round_trip() {
        let block = sample_blocks().remove(0);
        let bytes = serialize_message(
            NetworkId::Test,
            &Message::ConfirmReq(ConfirmReq { block }),
        )
        .unwrap();
        assert!(matches!(
            deserialize_message(NetworkId::Test, &bytes).unwrap(),
            Message::ConfirmReq(_)
        ));
    }

    #[test]
    fn confirm_ack_round_trip() {
        let key = keypair_from_seed(&[0x33; 32]);
        let vote = Vote::new(
            derive_account(&key.public),
            &key.private,
            5,
            sample_blocks().remove(1),
        );
        let bytes = serialize_message(
            NetworkId::Test,
            &Message::ConfirmAck(ConfirmAck { vote }),
        )
        .unwrap();
        match deserialize_message(NetworkId::Test, &bytes).unwrap() {
            Message::ConfirmAck(a) => {
                assert_eq!(a.vote.sequence, 5);
                assert!(a.vote.validate());
            }
            other => panic!("expected ConfirmAck, got {other:?}"),
        }
    }

    #[test]
    fn wrong_network_rejected() {
        let bytes =
            serialize_message(NetworkId::Live, &Message::Keepalive(Keepalive::default())).unwrap();
        assert!(matches!(
            deserialize_message(NetworkId::Test, &bytes),
            Err(MessageError::WrongNetwork(_))
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes =
            serialize_message(NetworkId::Test, &Message::Keepalive(Keepalive::default())).unwrap();
        bytes[0] = b'?';
        assert!(matches!(
            deserialize_message(NetworkId::Test, &bytes),
            Err(MessageError::BadMagic(_))
        ));
    }

    #[test]
    fn short_and_corrupt_datagrams_rejected() {
        assert_eq!(
            deserialize_message(NetworkId::Test, &[]),
            Err(MessageError::TooShort)
        );
        assert_eq!(
            deserialize_message(NetworkId::Test, &[MAGIC, b'T']),
            Err(MessageError::TooShort)
        );
        let garbage = [MAGIC, b'T', PROTOCOL_VERSION, 2, 0xFF, 0xFF];
        assert!(matches!(
            deserialize_message(NetworkId::Test, &garbage),
            Err(MessageError::Body(_))
        ));
    }

    #[test]
    fn unknown_type_rejected() {
        let bytes = [MAGIC, b'T', PROTOCOL_VERSION, 99];
        assert_eq!(
            deserialize_message(NetworkId::Test, &bytes),
            Err(MessageError::UnknownType(99))
        );
    }

    #[test]
    fn header_body_type_mismatch_rejected() {
        let mut bytes =
            serialize_message(NetworkId::Test, &Message::Keepalive(Keepalive::default())).unwrap();
        bytes[3] = MessageType::Publish as u8;
        assert_eq!(
            deserialize_message(NetworkId::Test, &bytes),
            Err(MessageError::TypeMismatch)
        );
    }

    #[test]
    fn truncated_body_rejected() {
        let bytes = serialize_message(
            NetworkId::Test,
            &Message::Publish(Publish {
                block: sample_blocks().remove(0),
            }),
        )
        .unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            deserialize_message(NetworkId::Test, truncated),
            Err(MessageError::Body(_))
        ));
    }
}

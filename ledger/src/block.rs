//! Block variants.
//!
//! Four kinds of block make up an account chain: `send`, `receive`, `open`,
//! and `change`. Blocks are immutable once constructed (work and signature
//! are set during creation, before the block enters any queue or cache) and
//! are shared behind `Arc` wherever ownership would otherwise require a copy.
//! Equality is by hash.

use lattice_crypto::{blake2b_256_parts, sign_message, verify_signature};
use lattice_types::{Account, Amount, BlockHash, PrivateKey, PublicKey, Root, Signature};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sends an amount to a destination account. `balance` is the sender's
/// remaining balance after the send; the amount transferred is the
/// difference from the previous balance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendBlock {
    pub previous: BlockHash,
    pub destination: Account,
    pub balance: Amount,
    pub work: u64,
    pub signature: Signature,
}

/// Receives a pending send on an existing chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiveBlock {
    pub previous: BlockHash,
    pub source: BlockHash,
    pub work: u64,
    pub signature: Signature,
}

/// Opens a new account chain by receiving its first send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenBlock {
    pub source: BlockHash,
    pub representative: Account,
    pub account: Account,
    pub work: u64,
    pub signature: Signature,
}

/// Changes the account's representative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeBlock {
    pub previous: BlockHash,
    pub representative: Account,
    pub work: u64,
    pub signature: Signature,
}

/// The block kind tag, also the first byte of the hash preimage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Send,
    Receive,
    Open,
    Change,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Open => "open",
            Self::Change => "change",
        };
        write!(f, "{name}")
    }
}

/// A block on an account chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Send(_) => BlockKind::Send,
            Self::Receive(_) => BlockKind::Receive,
            Self::Open(_) => BlockKind::Open,
            Self::Change(_) => BlockKind::Change,
        }
    }

    /// The cryptographic hash identifying this block. Work and signature are
    /// not part of the preimage.
    pub fn hash(&self) -> BlockHash {
        let digest = match self {
            Self::Send(b) => blake2b_256_parts(&[
                &[0x01][..],
                b.previous.as_bytes(),
                b.destination.as_bytes(),
                &b.balance.raw().to_be_bytes(),
            ]),
            Self::Receive(b) => {
                blake2b_256_parts(&[&[0x02][..], b.previous.as_bytes(), b.source.as_bytes()])
            }
            Self::Open(b) => blake2b_256_parts(&[
                &[0x03][..],
                b.source.as_bytes(),
                b.representative.as_bytes(),
                b.account.as_bytes(),
            ]),
            Self::Change(b) => blake2b_256_parts(&[
                &[0x04][..],
                b.previous.as_bytes(),
                b.representative.as_bytes(),
            ]),
        };
        BlockHash::new(digest)
    }

    /// The election root: the predecessor for non-open blocks, the account
    /// for open blocks.
    pub fn root(&self) -> Root {
        match self {
            Self::Send(b) => Root::from(b.previous),
            Self::Receive(b) => Root::from(b.previous),
            Self::Open(b) => Root::from(b.account),
            Self::Change(b) => Root::from(b.previous),
        }
    }

    /// The predecessor hash; zero for open blocks.
    pub fn previous(&self) -> BlockHash {
        match self {
            Self::Send(b) => b.previous,
            Self::Receive(b) => b.previous,
            Self::Open(_) => BlockHash::ZERO,
            Self::Change(b) => b.previous,
        }
    }

    /// The source send hash for receive/open blocks.
    pub fn source(&self) -> Option<BlockHash> {
        match self {
            Self::Receive(b) => Some(b.source),
            Self::Open(b) => Some(b.source),
            _ => None,
        }
    }

    pub fn work(&self) -> u64 {
        match self {
            Self::Send(b) => b.work,
            Self::Receive(b) => b.work,
            Self::Open(b) => b.work,
            Self::Change(b) => b.work,
        }
    }

    pub fn set_work(&mut self, work: u64) {
        match self {
            Self::Send(b) => b.work = work,
            Self::Receive(b) => b.work = work,
            Self::Open(b) => b.work = work,
            Self::Change(b) => b.work = work,
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            Self::Send(b) => &b.signature,
            Self::Receive(b) => &b.signature,
            Self::Open(b) => &b.signature,
            Self::Change(b) => &b.signature,
        }
    }

    /// Sign the block hash with the account's private key.
    pub fn sign(&mut self, private: &PrivateKey) {
        let signature = sign_message(self.hash().as_bytes(), private);
        match self {
            Self::Send(b) => b.signature = signature,
            Self::Receive(b) => b.signature = signature,
            Self::Open(b) => b.signature = signature,
            Self::Change(b) => b.signature = signature,
        }
    }

    /// Verify the signature against the owning account's public key.
    pub fn verify(&self, account: &Account) -> bool {
        let public = PublicKey(*account.as_bytes());
        verify_signature(self.hash().as_bytes(), &public, self.signature())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("block serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bincode::deserialize(bytes).ok()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Block {}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_crypto::keypair_from_seed;

    fn account(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    fn hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    fn sample_send() -> Block {
        Block::Send(SendBlock {
            previous: hash(1),
            destination: account(2),
            balance: Amount::new(500),
            work: 0xBEEF,
            signature: Signature::ZERO,
        })
    }

    #[test]
    fn serialize_round_trip_all_variants() {
        let blocks = vec![
            sample_send(),
            Block::Receive(ReceiveBlock {
                previous: hash(1),
                source: hash(2),
                work: 1,
                signature: Signature([0x11; 64]),
            }),
            Block::Open(OpenBlock {
                source: hash(3),
                representative: account(4),
                account: account(5),
                work: 2,
                signature: Signature([0x22; 64]),
            }),
            Block::Change(ChangeBlock {
                previous: hash(6),
                representative: account(7),
                work: 3,
                signature: Signature([0x33; 64]),
            }),
        ];
        for block in blocks {
            let decoded = Block::from_bytes(&block.to_bytes()).expect("decodes");
            assert_eq!(decoded, block);
            assert_eq!(decoded.hash(), block.hash());
            assert_eq!(decoded.work(), block.work());
            assert_eq!(decoded.signature(), block.signature());
        }
    }

    #[test]
    fn hash_ignores_work_and_signature() {
        let a = sample_send();
        let mut b = a.clone();
        b.set_work(999);
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a, b);
    }

    #[test]
    fn hash_covers_content() {
        let a = sample_send();
        let b = Block::Send(SendBlock {
            previous: hash(1),
            destination: account(2),
            balance: Amount::new(501),
            work: 0xBEEF,
            signature: Signature::ZERO,
        });
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn open_root_is_account() {
        let block = Block::Open(OpenBlock {
            source: hash(1),
            representative: account(2),
            account: account(3),
            work: 0,
            signature: Signature::ZERO,
        });
        assert_eq!(block.root(), Root::from(account(3)));
        assert!(block.previous().is_zero());
    }

    #[test]
    fn send_root_is_previous() {
        let block = sample_send();
        assert_eq!(block.root(), Root::from(hash(1)));
        assert!(block.source().is_none());
    }

    #[test]
    fn sign_and_verify() {
        let kp = keypair_from_seed(&[42u8; 32]);
        let owner = lattice_crypto::derive_account(&kp.public);
        let mut block = sample_send();
        block.sign(&kp.private);
        assert!(block.verify(&owner));
        assert!(!block.verify(&account(1)));
    }

    #[test]
    fn corrupt_bytes_rejected() {
        assert!(Block::from_bytes(&[0xFF, 0xFE, 0xFD]).is_none());
        assert!(Block::from_bytes(&[]).is_none());
    }
}

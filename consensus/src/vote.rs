//! A signed representative vote for one block.

use std::sync::Arc;

use lattice_crypto::{blake2b_256_parts, sign_message, verify_signature};
use lattice_ledger::Block;
use lattice_types::{Account, PrivateKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// A vote: `account` endorses `block` at `sequence`. Higher sequences from
/// the same account supersede lower ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub account: Account,
    pub signature: Signature,
    pub sequence: u64,
    pub block: Arc<Block>,
}

impl Vote {
    pub fn new(account: Account, private: &PrivateKey, sequence: u64, block: Arc<Block>) -> Self {
        let digest = Self::digest(&block, sequence);
        Self {
            account,
            signature: sign_message(&digest, private),
            sequence,
            block,
        }
    }

    /// Verify the signature against the voting account.
    pub fn validate(&self) -> bool {
        let digest = Self::digest(&self.block, self.sequence);
        let public = PublicKey(*self.account.as_bytes());
        verify_signature(&digest, &public, &self.signature)
    }

    fn digest(block: &Block, sequence: u64) -> [u8; 32] {
        blake2b_256_parts(&[block.hash().as_bytes(), &sequence.to_le_bytes()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_crypto::{derive_account, keypair_from_seed};
    use lattice_ledger::SendBlock;
    use lattice_types::{Amount, BlockHash};

    fn sample_block() -> Arc<Block> {
        Arc::new(Block::Send(SendBlock {
            previous: BlockHash::new([1u8; 32]),
            destination: Account::new([2u8; 32]),
            balance: Amount::new(5),
            work: 0,
            signature: Signature::ZERO,
        }))
    }

    #[test]
    fn signed_vote_validates() {
        let kp = keypair_from_seed(&[8u8; 32]);
        let vote = Vote::new(derive_account(&kp.public), &kp.private, 3, sample_block());
        assert!(vote.validate());
    }

    #[test]
    fn altered_sequence_invalidates() {
        let kp = keypair_from_seed(&[8u8; 32]);
        let mut vote = Vote::new(derive_account(&kp.public), &kp.private, 3, sample_block());
        vote.sequence = 4;
        assert!(!vote.validate());
    }

    #[test]
    fn wrong_account_invalidates() {
        let kp = keypair_from_seed(&[8u8; 32]);
        let mut vote = Vote::new(derive_account(&kp.public), &kp.private, 3, sample_block());
        vote.account = Account::new([9u8; 32]);
        assert!(!vote.validate());
    }

    #[test]
    fn bincode_round_trip() {
        let kp = keypair_from_seed(&[8u8; 32]);
        let vote = Vote::new(derive_account(&kp.public), &kp.private, 7, sample_block());
        let bytes = bincode::serialize(&vote).unwrap();
        let decoded: Vote = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.account, vote.account);
        assert_eq!(decoded.sequence, 7);
        assert_eq!(decoded.block.hash(), vote.block.hash());
        assert!(decoded.validate());
    }
}

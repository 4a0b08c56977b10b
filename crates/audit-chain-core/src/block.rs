//! Block: an immutable, signed batch of entries.

use serde::{Deserialize, Serialize};

use crate::chain::{aggregate_digest, block_hash, genesis_block_id, genesis_hash, GenesisDescriptor};
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature};
use crate::signer::Signer;
use crate::types::BlockId;

/// A sealed block header.
///
/// Entries are stored separately and found by height; `entry_count` records
/// how many were sealed so a missing or extra entry is detectable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub height: u64,

    /// Sealing time (Unix milliseconds).
    pub timestamp: i64,

    /// Hash of the block at `height - 1`, or the genesis hash at height 0.
    pub previous_block_hash: Blake3Hash,

    /// Digest over the sealed entries' hashes, in claim order.
    pub aggregate_digest: Blake3Hash,

    pub hash: Blake3Hash,

    /// Signature over `hash`.
    pub signature: Ed25519Signature,

    pub signer_id: String,
    pub entry_count: u64,
}

impl Block {
    /// Seal a block over the given entry hashes.
    pub fn seal(
        id: BlockId,
        height: u64,
        timestamp: i64,
        previous_block_hash: Blake3Hash,
        entry_hashes: &[Blake3Hash],
        signer: &Signer,
    ) -> Self {
        let digest = aggregate_digest(entry_hashes);
        let hash = block_hash(
            &id,
            height,
            timestamp,
            &previous_block_hash,
            &digest,
            signer.signer_id(),
        );
        let signature = signer.sign(&hash.0);

        Self {
            id,
            height,
            timestamp,
            previous_block_hash,
            aggregate_digest: digest,
            hash,
            signature,
            signer_id: signer.signer_id().to_string(),
            entry_count: entry_hashes.len() as u64,
        }
    }

    /// The height-0 block. Id and timestamp come from the descriptor, so
    /// only the signature differs between ledgers sharing a descriptor.
    pub fn genesis(descriptor: &GenesisDescriptor, signer: &Signer) -> Self {
        Self::seal(
            genesis_block_id(descriptor),
            0,
            descriptor.epoch_ms,
            genesis_hash(descriptor),
            &[],
            signer,
        )
    }

    /// Recompute the header hash from the stored fields.
    pub fn compute_hash(&self) -> Blake3Hash {
        block_hash(
            &self.id,
            self.height,
            self.timestamp,
            &self.previous_block_hash,
            &self.aggregate_digest,
            &self.signer_id,
        )
    }

    /// Check the signature against any of the given keys.
    pub fn signature_valid_for(&self, keys: &[Ed25519PublicKey]) -> bool {
        keys.iter()
            .any(|key| key.verify(&self.hash.0, &self.signature).is_ok())
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn signer() -> Signer {
        Signer::from_keypair(Keypair::from_seed(&[0x42; 32]), "primary")
    }

    #[test]
    fn test_seal_and_verify() {
        let signer = signer();
        let hashes = [Blake3Hash::from_bytes([1; 32]), Blake3Hash::from_bytes([2; 32])];
        let block = Block::seal(
            BlockId::from_bytes([5; 16]),
            1,
            1000,
            Blake3Hash::from_bytes([9; 32]),
            &hashes,
            &signer,
        );

        assert_eq!(block.entry_count, 2);
        assert_eq!(block.compute_hash(), block.hash);
        assert!(block.signature_valid_for(&[signer.public_key()]));
        assert!(signer.verify(&block.hash.0, &block.signature, None));
    }

    #[test]
    fn test_genesis_block() {
        let descriptor = GenesisDescriptor::default();
        let block = Block::genesis(&descriptor, &signer());

        assert!(block.is_genesis());
        assert_eq!(block.entry_count, 0);
        assert_eq!(block.aggregate_digest, Blake3Hash::ZERO);
        assert_eq!(block.previous_block_hash, genesis_hash(&descriptor));
        assert_eq!(block, Block::genesis(&descriptor, &signer()));
    }

    #[test]
    fn test_header_tamper_detected() {
        let mut block = Block::genesis(&GenesisDescriptor::default(), &signer());
        block.timestamp += 1;
        assert_ne!(block.compute_hash(), block.hash);
    }

    #[test]
    fn test_foreign_key_rejected() {
        let block = Block::genesis(&GenesisDescriptor::default(), &signer());
        let other = Keypair::from_seed(&[0x43; 32]).public_key();
        assert!(!block.signature_valid_for(&[other]));
        assert!(!block.signature_valid_for(&[]));
    }
}

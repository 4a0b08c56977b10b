//! Hash chain rules: the single source of truth for what gets hashed.
//!
//! All functions here are pure. Each hash is Blake3 over a domain tag
//! followed by the canonical CBOR encoding of the record's fields, so an
//! entry hash can never collide with a block hash over the same bytes.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_block_bytes, canonical_entry_bytes, canonical_genesis_bytes};
use crate::crypto::Blake3Hash;
use crate::event::EventType;
use crate::types::{BlockId, EntryId};

/// Domain tag for entry hashes.
pub const ENTRY_DOMAIN: &[u8] = b"audit-chain-entry-v1:";

/// Domain tag for block hashes.
pub const BLOCK_DOMAIN: &[u8] = b"audit-chain-block-v1:";

/// Domain tag for the genesis hash.
pub const GENESIS_DOMAIN: &[u8] = b"audit-chain-genesis-v1:";

/// `previous_hash` of the first entry ever recorded.
pub const ENTRY_CHAIN_ORIGIN: Blake3Hash = Blake3Hash::ZERO;

/// Fixed description of a ledger's starting point.
///
/// The genesis hash is derived from this descriptor only, never from live
/// data. Changing any field yields a different, incompatible ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDescriptor {
    pub version: u32,
    pub service: String,
    /// 2025-01-01T00:00:00Z for the default ledger.
    pub epoch_ms: i64,
    pub authority: String,
}

impl Default for GenesisDescriptor {
    fn default() -> Self {
        Self {
            version: 1,
            service: "audit-chain".to_string(),
            epoch_ms: 1_735_689_600_000,
            authority: "primary-validator".to_string(),
        }
    }
}

fn domain_hash(domain: &[u8], body: &[u8]) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(body);
    Blake3Hash(*hasher.finalize().as_bytes())
}

/// Hash of an entry's content and its link to the previous entry.
pub fn entry_hash(
    id: &EntryId,
    timestamp: i64,
    event_type: &EventType,
    payload: &serde_json::Value,
    previous_hash: &Blake3Hash,
) -> Blake3Hash {
    let body = canonical_entry_bytes(id, timestamp, event_type, payload, previous_hash);
    domain_hash(ENTRY_DOMAIN, &body)
}

/// Hash of a block header. This is the message the signer signs.
pub fn block_hash(
    id: &BlockId,
    height: u64,
    timestamp: i64,
    previous_block_hash: &Blake3Hash,
    aggregate_digest: &Blake3Hash,
    signer_id: &str,
) -> Blake3Hash {
    let body = canonical_block_bytes(
        id,
        height,
        timestamp,
        previous_block_hash,
        aggregate_digest,
        signer_id,
    );
    domain_hash(BLOCK_DOMAIN, &body)
}

/// Digest over a block's entry hashes, in claim order.
///
/// Blake3 of the concatenated hashes. Any change to an entry hash or to their
/// order changes the digest, but unlike a Merkle root it cannot produce
/// compact inclusion proofs. An empty set digests to [`Blake3Hash::ZERO`].
pub fn aggregate_digest<'a, I>(hashes: I) -> Blake3Hash
where
    I: IntoIterator<Item = &'a Blake3Hash>,
{
    let mut hasher = blake3::Hasher::new();
    let mut any = false;
    for hash in hashes {
        hasher.update(&hash.0);
        any = true;
    }
    if !any {
        return Blake3Hash::ZERO;
    }
    Blake3Hash(*hasher.finalize().as_bytes())
}

/// The block chain's origin: `previous_block_hash` of the genesis block.
pub fn genesis_hash(descriptor: &GenesisDescriptor) -> Blake3Hash {
    domain_hash(GENESIS_DOMAIN, &canonical_genesis_bytes(descriptor))
}

/// Deterministic id of the genesis block.
pub fn genesis_block_id(descriptor: &GenesisDescriptor) -> BlockId {
    let hash = genesis_hash(descriptor);
    let mut id = [0u8; 16];
    id.copy_from_slice(&hash.0[..16]);
    BlockId(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn event() -> EventType {
        EventType::parse("user.login").unwrap()
    }

    #[test]
    fn test_entry_hash_deterministic() {
        let id = EntryId::from_bytes([3; 16]);
        let payload = json!({"user": "bob"});
        let h1 = entry_hash(&id, 10, &event(), &payload, &ENTRY_CHAIN_ORIGIN);
        let h2 = entry_hash(&id, 10, &event(), &payload, &ENTRY_CHAIN_ORIGIN);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_entry_hash_depends_on_previous() {
        let id = EntryId::from_bytes([3; 16]);
        let payload = json!(null);
        let h1 = entry_hash(&id, 10, &event(), &payload, &ENTRY_CHAIN_ORIGIN);
        let h2 = entry_hash(&id, 10, &event(), &payload, &Blake3Hash::from_bytes([1; 32]));
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_entry_and_block_domains_differ() {
        assert_ne!(ENTRY_DOMAIN, BLOCK_DOMAIN);
        assert_ne!(BLOCK_DOMAIN, GENESIS_DOMAIN);
    }

    #[test]
    fn test_aggregate_digest_order_sensitive() {
        let a = Blake3Hash::from_bytes([1; 32]);
        let b = Blake3Hash::from_bytes([2; 32]);
        assert_ne!(aggregate_digest([&a, &b]), aggregate_digest([&b, &a]));
        assert_eq!(aggregate_digest([&a, &b]), aggregate_digest(&[a, b]));
    }

    #[test]
    fn test_aggregate_digest_empty() {
        assert_eq!(aggregate_digest(std::iter::empty()), Blake3Hash::ZERO);
    }

    #[test]
    fn test_genesis_hash_is_fixed() {
        let d = GenesisDescriptor::default();
        assert_eq!(genesis_hash(&d), genesis_hash(&GenesisDescriptor::default()));

        let other = GenesisDescriptor {
            authority: "backup-validator".into(),
            ..GenesisDescriptor::default()
        };
        assert_ne!(genesis_hash(&d), genesis_hash(&other));
        assert_ne!(genesis_block_id(&d), genesis_block_id(&other));
    }

    proptest! {
        #[test]
        fn prop_block_hash_height_sensitive(h1 in 0u64..1_000_000, h2 in 0u64..1_000_000) {
            let id = BlockId::from_bytes([9; 16]);
            let a = block_hash(&id, h1, 5, &Blake3Hash::ZERO, &Blake3Hash::ZERO, "s");
            let b = block_hash(&id, h2, 5, &Blake3Hash::ZERO, &Blake3Hash::ZERO, "s");
            prop_assert_eq!(a == b, h1 == h2);
        }

        #[test]
        fn prop_single_hash_change_changes_digest(
            hashes in prop::collection::vec(any::<[u8; 32]>(), 1..16),
            idx in any::<prop::sample::Index>(),
            flip in 0usize..32,
        ) {
            let original: Vec<Blake3Hash> = hashes.iter().copied().map(Blake3Hash).collect();
            let mut mutated = original.clone();
            let i = idx.index(mutated.len());
            mutated[i].0[flip] ^= 0x01;
            prop_assert_ne!(aggregate_digest(&original), aggregate_digest(&mutated));
        }
    }
}

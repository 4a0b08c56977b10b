//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical CBOR encoding of entries and of the
//! default genesis descriptor. Any implementation that hashes these bytes
//! the same way arrives at the same entry hashes and genesis hash.

use serde_json::{json, Value};

use audit_chain_core::canonical::{canonical_entry_bytes, canonical_genesis_bytes};
use audit_chain_core::{Blake3Hash, Entry, EntryBuilder, EntryId, EventType, GenesisDescriptor};

/// A golden entry vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub id: [u8; 16],
    pub timestamp: i64,
    pub event_type: &'static str,
    /// JSON payload text.
    pub payload: &'static str,
    pub previous_hash: [u8; 32],
    /// Expected canonical bytes (hex).
    pub expected_canonical: &'static str,
}

/// Canonical bytes of `GenesisDescriptor::default()` (hex).
pub const DEFAULT_GENESIS_CANONICAL: &str =
    "a40001016b61756469742d636861696e021b000001941f297c0003717072696d6172792d76616c696461746f72";

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "failed login, first entry",
            id: [0x11; 16],
            timestamp: 1736870400000, // 2025-01-14T16:00:00Z
            event_type: "security.login.failed",
            payload: r#"{"user":"alice","attempts":3}"#,
            previous_hash: [0x00; 32],
            expected_canonical: "a5005011111111111111111111111111111111011b00000194658b1000\
                                 027573656375726974792e6c6f67696e2e6661696c656403a2647573\
                                 657265616c69636568617474656d707473030458200000000000000000\
                                 000000000000000000000000000000000000000000000000",
        },
        GoldenVector {
            name: "mint transaction with float amount",
            id: [0x22; 16],
            timestamp: 1736870401000,
            event_type: "mint.transaction.created",
            payload: r#"{"currency":"EUR","amount":12.5}"#,
            previous_hash: [0xab; 32],
            expected_canonical: "a5005022222222222222222222222222222222011b00000194658b13e8\
                                 0278186d696e742e7472616e73616374696f6e2e6372656174656403\
                                 a266616d6f756e74fb40290000000000006863757272656e63796345\
                                 5552045820abababababababababababababababababababababababab\
                                 abababababababab",
        },
        GoldenVector {
            name: "bare category, null payload",
            id: [0x00; 16],
            timestamp: 0,
            event_type: "system",
            payload: "null",
            previous_hash: [0x00; 32],
            expected_canonical: "a500500000000000000000000000000000000001000266737973746\
                                 56d03f604582000000000000000000000000000000000000000000000\
                                 00000000000000000000",
        },
    ]
}

fn vector_inputs(vector: &GoldenVector) -> (EntryId, EventType, Value, Blake3Hash) {
    (
        EntryId::from_bytes(vector.id),
        EventType::parse(vector.event_type).expect("vector event type"),
        serde_json::from_str(vector.payload).expect("vector payload"),
        Blake3Hash::from_bytes(vector.previous_hash),
    )
}

/// Build the entry a vector describes.
pub fn entry_from_vector(vector: &GoldenVector) -> Entry {
    let (id, event_type, payload, previous) = vector_inputs(vector);
    EntryBuilder::new(event_type, payload)
        .id(id)
        .timestamp(vector.timestamp)
        .previous(previous)
        .signer_id("primary-validator")
        .build()
}

/// Canonical bytes a vector's inputs encode to.
pub fn canonical_from_vector(vector: &GoldenVector) -> Vec<u8> {
    let (id, event_type, payload, previous) = vector_inputs(vector);
    canonical_entry_bytes(&id, vector.timestamp, &event_type, &payload, &previous)
}

/// Check every vector against its expected encoding.
///
/// Returns `(name, matches, actual_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let actual = hex::encode(canonical_from_vector(v));
            (v.name.to_string(), actual == v.expected_canonical, actual)
        })
        .collect()
}

/// Canonical bytes of the default genesis descriptor (hex).
pub fn default_genesis_canonical_hex() -> String {
    hex::encode(canonical_genesis_bytes(&GenesisDescriptor::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_match_expected_encoding() {
        for (name, matches, actual) in verify_all_vectors() {
            assert!(matches, "vector '{}' encoded to {}", name, actual);
        }
    }

    #[test]
    fn test_genesis_encoding() {
        assert_eq!(default_genesis_canonical_hex(), DEFAULT_GENESIS_CANONICAL);
    }

    #[test]
    fn test_vectors_are_deterministic() {
        for vector in all_vectors() {
            let e1 = entry_from_vector(&vector);
            let e2 = entry_from_vector(&vector);
            assert_eq!(e1.hash, e2.hash, "vector '{}' hash drifted", vector.name);
            assert!(e1.verify_hash());
        }
    }

    #[test]
    fn test_vectors_have_distinct_hashes() {
        let hashes: Vec<_> = all_vectors().iter().map(|v| entry_from_vector(v).hash).collect();
        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_payload_text_order_irrelevant() {
        let reordered = GoldenVector {
            payload: r#"{"attempts":3,"user":"alice"}"#,
            ..all_vectors()[0].clone()
        };
        assert_eq!(
            canonical_from_vector(&reordered),
            canonical_from_vector(&all_vectors()[0])
        );
        assert_eq!(
            json!({"user": "alice", "attempts": 3}),
            serde_json::from_str::<Value>(reordered.payload).unwrap()
        );
    }
}

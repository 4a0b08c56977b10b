//! Canonical CBOR encoding for deterministic hashing.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - Floats always use the 8-byte form (payloads only; timestamps are i64 ms)
//!
//! Every hash in the ledger is computed over these bytes, so the same record
//! produces the same hash on every platform and in every implementation.

use ciborium::value::Value;

use crate::chain::GenesisDescriptor;
use crate::crypto::Blake3Hash;
use crate::event::EventType;
use crate::types::{BlockId, EntryId};

/// Entry field keys (integer keys for compact encoding).
mod entry_keys {
    pub const ID: u64 = 0;
    pub const TIMESTAMP: u64 = 1;
    pub const EVENT_TYPE: u64 = 2;
    pub const PAYLOAD: u64 = 3;
    pub const PREVIOUS_HASH: u64 = 4;
}

/// Block field keys.
mod block_keys {
    pub const ID: u64 = 0;
    pub const HEIGHT: u64 = 1;
    pub const TIMESTAMP: u64 = 2;
    pub const PREVIOUS_BLOCK_HASH: u64 = 3;
    pub const AGGREGATE_DIGEST: u64 = 4;
    pub const SIGNER_ID: u64 = 5;
}

/// Genesis descriptor keys.
mod genesis_keys {
    pub const VERSION: u64 = 0;
    pub const SERVICE: u64 = 1;
    pub const EPOCH: u64 = 2;
    pub const AUTHORITY: u64 = 3;
}

fn key(k: u64) -> Value {
    Value::Integer(k.into())
}

/// Encode the hashed fields of an entry.
pub fn canonical_entry_bytes(
    id: &EntryId,
    timestamp: i64,
    event_type: &EventType,
    payload: &serde_json::Value,
    previous_hash: &Blake3Hash,
) -> Vec<u8> {
    let value = Value::Map(vec![
        (key(entry_keys::ID), Value::Bytes(id.0.to_vec())),
        (key(entry_keys::TIMESTAMP), Value::Integer(timestamp.into())),
        (key(entry_keys::EVENT_TYPE), Value::Text(event_type.to_string())),
        (key(entry_keys::PAYLOAD), json_to_cbor(payload)),
        (key(entry_keys::PREVIOUS_HASH), Value::Bytes(previous_hash.0.to_vec())),
    ]);
    encode_cbor_value_canonical(&value)
}

/// Encode the hashed fields of a block.
pub fn canonical_block_bytes(
    id: &BlockId,
    height: u64,
    timestamp: i64,
    previous_block_hash: &Blake3Hash,
    aggregate_digest: &Blake3Hash,
    signer_id: &str,
) -> Vec<u8> {
    let value = Value::Map(vec![
        (key(block_keys::ID), Value::Bytes(id.0.to_vec())),
        (key(block_keys::HEIGHT), Value::Integer(height.into())),
        (key(block_keys::TIMESTAMP), Value::Integer(timestamp.into())),
        (
            key(block_keys::PREVIOUS_BLOCK_HASH),
            Value::Bytes(previous_block_hash.0.to_vec()),
        ),
        (
            key(block_keys::AGGREGATE_DIGEST),
            Value::Bytes(aggregate_digest.0.to_vec()),
        ),
        (key(block_keys::SIGNER_ID), Value::Text(signer_id.to_string())),
    ]);
    encode_cbor_value_canonical(&value)
}

/// Encode the genesis descriptor.
pub fn canonical_genesis_bytes(descriptor: &GenesisDescriptor) -> Vec<u8> {
    let value = Value::Map(vec![
        (key(genesis_keys::VERSION), Value::Integer(descriptor.version.into())),
        (key(genesis_keys::SERVICE), Value::Text(descriptor.service.clone())),
        (key(genesis_keys::EPOCH), Value::Integer(descriptor.epoch_ms.into())),
        (key(genesis_keys::AUTHORITY), Value::Text(descriptor.authority.clone())),
    ]);
    encode_cbor_value_canonical(&value)
}

/// Convert a JSON payload to a CBOR value.
///
/// Object key order in the source is irrelevant: the canonical encoder
/// re-sorts map keys.
pub fn json_to_cbor(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Value::Integer(u.into())
            } else if let Some(i) = n.as_i64() {
                Value::Integer(i.into())
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => Value::Array(items.iter().map(json_to_cbor).collect()),
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (Value::Text(k.clone()), json_to_cbor(v)))
                .collect(),
        ),
    }
}

/// Encode a CBOR Value to canonical bytes.
pub fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(f) => {
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Tag(tag, inner) => {
            encode_uint(buf, 6, *tag);
            encode_value_to(buf, inner);
        }
        _ => unreachable!("canonical encoder only receives values built in this module"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);
    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

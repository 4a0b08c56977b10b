//! Proptest strategies for ledger types.

use proptest::prelude::*;
use serde_json::{Map, Number, Value};

use audit_chain_core::{Blake3Hash, EntryBuilder, EntryId, EventType};

/// Generate a random Blake3 hash.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash)
}

/// Generate a random entry id.
pub fn entry_id() -> impl Strategy<Value = EntryId> {
    any::<[u8; 16]>().prop_map(EntryId::from_bytes)
}

/// Generate a timestamp between 1970 and 2100 (Unix ms).
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000i64
}

/// Generate a valid dotted event type, mixing known and unknown categories.
pub fn event_type() -> impl Strategy<Value = EventType> {
    let category = prop_oneof![
        Just("mint".to_string()),
        Just("education".to_string()),
        Just("forge".to_string()),
        Just("health".to_string()),
        Just("security".to_string()),
        Just("user".to_string()),
        Just("system".to_string()),
        "[a-z][a-z0-9_]{0,11}",
    ];
    let actions = prop::collection::vec("[a-z][a-z0-9_]{0,11}", 0..3);

    (category, actions).prop_map(|(category, actions)| {
        let mut name = category;
        for action in actions {
            name.push('.');
            name.push_str(&action);
        }
        EventType::parse(&name).expect("generated names are well formed")
    })
}

/// Generate a JSON number: integers of either sign or finite floats.
fn json_number() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<u64>().prop_map(|n| Value::Number(n.into())),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        (-1.0e12f64..1.0e12f64).prop_map(|f| {
            Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }),
    ]
}

/// Generate an arbitrary JSON payload up to a small nesting depth.
pub fn json_payload() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        json_number(),
        "[ -~]{0,16}".prop_map(Value::String),
    ];

    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Parameters for generating an entry.
#[derive(Debug, Clone)]
pub struct EntryParams {
    pub id: EntryId,
    pub timestamp: i64,
    pub event_type: EventType,
    pub payload: Value,
    pub previous_hash: Blake3Hash,
}

impl Arbitrary for EntryParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (entry_id(), timestamp(), event_type(), json_payload(), blake3_hash())
            .prop_map(|(id, timestamp, event_type, payload, previous_hash)| EntryParams {
                id,
                timestamp,
                event_type,
                payload,
                previous_hash,
            })
            .boxed()
    }
}

/// Build an entry from parameters.
pub fn entry_from_params(params: &EntryParams) -> audit_chain_core::Entry {
    EntryBuilder::new(params.event_type.clone(), params.payload.clone())
        .id(params.id)
        .timestamp(params.timestamp)
        .previous(params.previous_hash)
        .signer_id("primary-validator")
        .build()
}

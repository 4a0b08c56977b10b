//! # Audit Chain Core
//!
//! Pure primitives for a tamper-evident audit ledger: entries, blocks, hash
//! chaining, signing, and canonicalization.
//!
//! This crate contains no storage and no scheduling. Apart from reading and
//! writing a key seed file, it is pure computation over cryptographic data
//! structures.
//!
//! ## Key Types
//!
//! - [`Entry`] - One recorded event, hash-linked to its predecessor
//! - [`Block`] - A signed batch of entries, hash-linked to the previous block
//! - [`Signer`] - The node's Ed25519 signing identity
//! - [`EventType`] - Dotted event name (`security.login.failed`)
//! - [`ChainAudit`] - Full-history validation producing a [`ValidationReport`]
//!
//! ## Canonicalization
//!
//! Every hash is computed over deterministic CBOR. See [`canonical`] and
//! [`chain`].

pub mod block;
pub mod canonical;
pub mod chain;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod event;
pub mod signer;
pub mod types;
pub mod validation;

pub use block::Block;
pub use chain::{
    aggregate_digest, block_hash, entry_hash, genesis_block_id, genesis_hash, GenesisDescriptor,
    ENTRY_CHAIN_ORIGIN,
};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use entry::{Entry, EntryBuilder};
pub use error::CoreError;
pub use event::{EventCategory, EventFilter, EventType};
pub use signer::Signer;
pub use types::{now_millis, BlockId, EntryId};
pub use validation::{
    ChainAudit, Scanned, UndecodableRecord, ValidationReport, Violation, ViolationReason,
    ViolationScope,
};

//! # Audit Chain Testkit
//!
//! Testing utilities for the audit chain.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Pinned canonical encodings for cross-platform verification
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Ready-made ledgers and a fault-injecting store wrapper
//!
//! ## Golden Vectors
//!
//! ```rust
//! use audit_chain_testkit::vectors::{all_vectors, entry_from_vector};
//!
//! for vector in all_vectors() {
//!     let entry = entry_from_vector(&vector);
//!     println!("{}: {}", vector.name, entry.hash.to_hex());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use audit_chain_testkit::generators::{EntryParams, entry_from_params};
//!
//! proptest! {
//!     #[test]
//!     fn entry_hash_is_deterministic(params: EntryParams) {
//!         prop_assert_eq!(entry_from_params(&params).hash, entry_from_params(&params).hash);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use audit_chain_testkit::fixtures::LedgerFixture;
//!
//! # async fn example() {
//! let fixture = LedgerFixture::new().await;
//! let ids = fixture.record_n(3, "user.login").await;
//! let block = fixture.seal().await;
//! assert_eq!(block.entry_count, ids.len() as u64);
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{test_signer, FaultyStore, LedgerFixture, TEST_SEED};

//! Chain validation: re-derive every hash, digest, link and signature.
//!
//! [`ChainAudit`] is fed blocks in ascending height order, each with its
//! entries in persisted order, and accumulates every deviation it finds. It
//! never stops at the first problem, so one pass yields a full report.
//!
//! Entry linkage is continuous across block boundaries: the first entry of
//! block `n` must point at the last entry of block `n - 1`. Links are checked
//! against the *stored* hash of the predecessor, so a single tampered entry
//! shows up as one hash mismatch rather than a cascade of broken links.
//!
//! Records a store could not decode are fed in as [`UndecodableRecord`]s.
//! Each becomes a single violation, and its stored hash (when readable)
//! keeps the surrounding links and digests checkable.

use serde::Serialize;
use thiserror::Error;

use crate::block::Block;
use crate::chain::{aggregate_digest, ENTRY_CHAIN_ORIGIN};
use crate::crypto::{Blake3Hash, Ed25519PublicKey};
use crate::entry::Entry;

/// What kind of record a violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationScope {
    Entry,
    Block,
}

/// Why a record failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ViolationReason {
    #[error("entry hash mismatch: stored {stored}, computed {computed}")]
    EntryHashMismatch {
        stored: Blake3Hash,
        computed: Blake3Hash,
    },

    #[error("entry previous hash mismatch: expected {expected}, found {found}")]
    BrokenEntryLink {
        expected: Blake3Hash,
        found: Blake3Hash,
    },

    #[error("entry signer {entry_signer:?} does not match block signer {block_signer:?}")]
    SignerMismatch {
        block_signer: String,
        entry_signer: String,
    },

    #[error("block height gap: expected {expected}, found {found}")]
    HeightGap { expected: u64, found: u64 },

    #[error("block hash mismatch: stored {stored}, computed {computed}")]
    BlockHashMismatch {
        stored: Blake3Hash,
        computed: Blake3Hash,
    },

    #[error("block previous hash mismatch: expected {expected}, found {found}")]
    BrokenBlockLink {
        expected: Blake3Hash,
        found: Blake3Hash,
    },

    #[error("block signature invalid")]
    InvalidSignature,

    #[error("aggregate digest mismatch: stored {stored}, computed {computed}")]
    AggregateDigestMismatch {
        stored: Blake3Hash,
        computed: Blake3Hash,
    },

    #[error("entry count mismatch: block records {recorded}, found {found}")]
    EntryCountMismatch { recorded: u64, found: u64 },

    #[error("genesis block holds {0} entries")]
    GenesisNotEmpty(u64),

    #[error("stored record cannot be decoded: {detail}")]
    Undecodable { detail: String },
}

/// A persisted row that failed to decode, with whatever could be salvaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodableRecord {
    /// Hex of the raw id column.
    pub id: String,
    pub height: Option<u64>,
    /// The stored hash, if that column still decodes.
    pub hash: Option<Blake3Hash>,
    pub detail: String,
}

impl UndecodableRecord {
    pub fn new(raw_id: &[u8], detail: impl Into<String>) -> Self {
        Self {
            id: hex::encode(raw_id),
            height: None,
            hash: None,
            detail: detail.into(),
        }
    }

    pub fn with_height(mut self, height: Option<u64>) -> Self {
        self.height = height;
        self
    }

    pub fn with_hash(mut self, hash: Option<Blake3Hash>) -> Self {
        self.hash = hash;
        self
    }
}

/// One row as read back from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scanned<T> {
    Decoded(T),
    Undecodable(UndecodableRecord),
}

#[derive(Clone, Copy)]
enum EntryRow<'a> {
    Decoded(&'a Entry),
    Undecodable(&'a UndecodableRecord),
}

impl<'a> EntryRow<'a> {
    fn stored_hash(&self) -> Option<Blake3Hash> {
        match self {
            EntryRow::Decoded(entry) => Some(entry.hash),
            EntryRow::Undecodable(record) => record.hash,
        }
    }
}

impl<'a> From<&'a Scanned<Entry>> for EntryRow<'a> {
    fn from(row: &'a Scanned<Entry>) -> Self {
        match row {
            Scanned::Decoded(entry) => EntryRow::Decoded(entry),
            Scanned::Undecodable(record) => EntryRow::Undecodable(record),
        }
    }
}

/// One deviation found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub scope: ViolationScope,
    /// Hex id of the offending entry or block.
    pub id: String,
    pub reason: ViolationReason,
}

/// Result of a full validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
    pub blocks_checked: u64,
    pub entries_checked: u64,
}

impl ValidationReport {
    /// Violations referring to a given record id.
    pub fn violations_for<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.id == id)
    }
}

/// Incremental validator over an ordered block history.
#[derive(Debug)]
pub struct ChainAudit {
    trusted_keys: Vec<Ed25519PublicKey>,
    expected_height: u64,
    expected_block_link: Blake3Hash,
    /// `None` after an entry whose hash could not be read.
    expected_entry_link: Option<Blake3Hash>,
    report: ValidationReport,
}

impl ChainAudit {
    /// Start an audit at the given genesis hash.
    ///
    /// `trusted_keys` is the current key plus any retained retired keys; a
    /// block signature is valid if any of them verifies it.
    pub fn new(genesis_hash: Blake3Hash, trusted_keys: Vec<Ed25519PublicKey>) -> Self {
        Self {
            trusted_keys,
            expected_height: 0,
            expected_block_link: genesis_hash,
            expected_entry_link: Some(ENTRY_CHAIN_ORIGIN),
            report: ValidationReport::default(),
        }
    }

    /// Check one block and its entries (in persisted order).
    pub fn check_block(&mut self, block: &Block, entries: &[Entry]) {
        let rows: Vec<_> = entries.iter().map(EntryRow::Decoded).collect();
        self.check_block_rows(block, &rows);
    }

    /// Like [`check_block`](Self::check_block), for rows read back from a
    /// store that may hold undecodable entries.
    pub fn check_scanned_block(&mut self, block: &Block, entries: &[Scanned<Entry>]) {
        let rows: Vec<_> = entries.iter().map(EntryRow::from).collect();
        self.check_block_rows(block, &rows);
    }

    /// A block row that could not be decoded. Its entries still go through
    /// the entry chain checks.
    pub fn check_undecodable_block(&mut self, record: &UndecodableRecord, entries: &[Scanned<Entry>]) {
        self.block_violation(
            &record.id,
            ViolationReason::Undecodable {
                detail: record.detail.clone(),
            },
        );
        for row in entries {
            self.check_row_chain(row.into());
        }

        if let Some(height) = record.height {
            self.expected_height = height + 1;
        }
        if let Some(hash) = record.hash {
            self.expected_block_link = hash;
        }
        self.report.blocks_checked += 1;
    }

    fn check_block_rows(&mut self, block: &Block, entries: &[EntryRow<'_>]) {
        let block_id = block.id.to_hex();

        if block.height != self.expected_height {
            self.block_violation(
                &block_id,
                ViolationReason::HeightGap {
                    expected: self.expected_height,
                    found: block.height,
                },
            );
        }

        if block.previous_block_hash != self.expected_block_link {
            self.block_violation(
                &block_id,
                ViolationReason::BrokenBlockLink {
                    expected: self.expected_block_link,
                    found: block.previous_block_hash,
                },
            );
        }

        let computed = block.compute_hash();
        if computed != block.hash {
            self.block_violation(
                &block_id,
                ViolationReason::BlockHashMismatch {
                    stored: block.hash,
                    computed,
                },
            );
        }

        if !block.signature_valid_for(&self.trusted_keys) {
            self.block_violation(&block_id, ViolationReason::InvalidSignature);
        }

        // An unreadable entry hash is already its own violation.
        let hashes: Option<Vec<Blake3Hash>> = entries.iter().map(EntryRow::stored_hash).collect();
        if let Some(hashes) = hashes {
            let digest = aggregate_digest(hashes.iter());
            if digest != block.aggregate_digest {
                self.block_violation(
                    &block_id,
                    ViolationReason::AggregateDigestMismatch {
                        stored: block.aggregate_digest,
                        computed: digest,
                    },
                );
            }
        }

        let found = entries.len() as u64;
        if found != block.entry_count {
            self.block_violation(
                &block_id,
                ViolationReason::EntryCountMismatch {
                    recorded: block.entry_count,
                    found,
                },
            );
        }

        if block.is_genesis() && found > 0 {
            self.block_violation(&block_id, ViolationReason::GenesisNotEmpty(found));
        }

        for row in entries {
            match *row {
                EntryRow::Decoded(entry) => self.check_entry(entry, &block.signer_id),
                undecodable => self.check_row_chain(undecodable),
            }
        }

        self.expected_height = block.height + 1;
        self.expected_block_link = block.hash;
        self.report.blocks_checked += 1;
    }

    /// Check entries not (yet) covered by a block: pending ones, or a batch
    /// claimed for the next height. Only hash and linkage apply.
    pub fn check_unsealed(&mut self, entries: &[Scanned<Entry>]) {
        for row in entries {
            self.check_row_chain(row.into());
        }
    }

    fn check_row_chain(&mut self, row: EntryRow<'_>) {
        match row {
            EntryRow::Decoded(entry) => self.check_entry_chain(entry),
            EntryRow::Undecodable(record) => {
                self.entry_violation(
                    &record.id,
                    ViolationReason::Undecodable {
                        detail: record.detail.clone(),
                    },
                );
                self.expected_entry_link = record.hash;
                self.report.entries_checked += 1;
            }
        }
    }

    fn check_entry(&mut self, entry: &Entry, block_signer: &str) {
        if entry.signer_id != block_signer {
            self.entry_violation(
                &entry.id.to_hex(),
                ViolationReason::SignerMismatch {
                    block_signer: block_signer.to_string(),
                    entry_signer: entry.signer_id.clone(),
                },
            );
        }
        self.check_entry_chain(entry);
    }

    fn check_entry_chain(&mut self, entry: &Entry) {
        let entry_id = entry.id.to_hex();

        let computed = entry.compute_hash();
        if computed != entry.hash {
            self.entry_violation(
                &entry_id,
                ViolationReason::EntryHashMismatch {
                    stored: entry.hash,
                    computed,
                },
            );
        }

        if let Some(expected) = self.expected_entry_link {
            if entry.previous_hash != expected {
                self.entry_violation(
                    &entry_id,
                    ViolationReason::BrokenEntryLink {
                        expected,
                        found: entry.previous_hash,
                    },
                );
            }
        }

        self.expected_entry_link = Some(entry.hash);
        self.report.entries_checked += 1;
    }

    fn block_violation(&mut self, id: &str, reason: ViolationReason) {
        self.report.violations.push(Violation {
            scope: ViolationScope::Block,
            id: id.to_string(),
            reason,
        });
    }

    fn entry_violation(&mut self, id: &str, reason: ViolationReason) {
        self.report.violations.push(Violation {
            scope: ViolationScope::Entry,
            id: id.to_string(),
            reason,
        });
    }

    /// Finish the audit and produce the report.
    pub fn finish(mut self) -> ValidationReport {
        self.report.is_valid = self.report.violations.is_empty();
        self.report
    }
}

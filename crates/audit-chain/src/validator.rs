//! ChainValidator: full-history verification against a store.
//!
//! Streams blocks from the store in height order and feeds them, with their
//! entries, to [`ChainAudit`]. Entries stamped past the last block (a claimed
//! batch whose block is not persisted yet) and pending entries are checked
//! afterwards for hash and linkage, so the whole persisted entry chain is
//! covered.
//!
//! Rows the store cannot decode are reported as violations, never as errors.

use std::sync::Arc;

use audit_chain_core::{Blake3Hash, ChainAudit, Ed25519PublicKey, Scanned, ValidationReport};
use audit_chain_store::LedgerStore;

use crate::error::Result;

/// Blocks fetched per store round trip.
const BLOCK_PAGE_SIZE: usize = 256;

/// Re-verifies every persisted block and entry.
pub struct ChainValidator<S: LedgerStore> {
    store: Arc<S>,
    genesis_hash: Blake3Hash,
    trusted_keys: Vec<Ed25519PublicKey>,
}

impl<S: LedgerStore> ChainValidator<S> {
    /// `trusted_keys` holds the current signing key and any retired ones.
    pub fn new(store: Arc<S>, genesis_hash: Blake3Hash, trusted_keys: Vec<Ed25519PublicKey>) -> Self {
        Self {
            store,
            genesis_hash,
            trusted_keys,
        }
    }

    /// Run a full pass.
    ///
    /// Store failures abort with `Err`; integrity failures never do, they
    /// end up in the report.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let mut audit = ChainAudit::new(self.genesis_hash, self.trusted_keys.clone());
        let mut next_height = 0u64;

        loop {
            let page = self
                .store
                .scan_blocks_by_height(next_height, BLOCK_PAGE_SIZE)
                .await?;
            let full_page = page.len() == BLOCK_PAGE_SIZE;
            let mut advanced = false;

            for row in &page {
                match row {
                    Scanned::Decoded(block) => {
                        let entries = self.store.scan_entries_at_height(block.height).await?;
                        audit.check_scanned_block(block, &entries);
                        next_height = block.height + 1;
                        advanced = true;
                    }
                    Scanned::Undecodable(record) => {
                        let entries = match record.height {
                            Some(height) => {
                                next_height = height + 1;
                                advanced = true;
                                self.store.scan_entries_at_height(height).await?
                            }
                            None => Vec::new(),
                        };
                        audit.check_undecodable_block(record, &entries);
                    }
                }
            }

            if !full_page || !advanced {
                break;
            }
        }

        let unsealed = self.store.scan_entries_at_height(next_height).await?;
        audit.check_unsealed(&unsealed);
        let pending = self.store.scan_pending_entries().await?;
        audit.check_unsealed(&pending);

        let report = audit.finish();
        for violation in &report.violations {
            tracing::warn!(
                scope = ?violation.scope,
                id = %violation.id,
                reason = %violation.reason,
                "integrity violation"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_chain_core::{
        genesis_hash, Block, EntryBuilder, EventType, GenesisDescriptor, Keypair, Signer,
        ViolationReason,
    };
    use audit_chain_store::MemoryStore;
    use serde_json::json;

    fn make_test_signer() -> Signer {
        Signer::from_keypair(Keypair::from_seed(&[0x42; 32]), "primary")
    }

    fn make_validator(store: Arc<MemoryStore>, signer: &Signer) -> ChainValidator<MemoryStore> {
        ChainValidator::new(
            store,
            genesis_hash(&GenesisDescriptor::default()),
            vec![signer.public_key()],
        )
    }

    #[tokio::test]
    async fn test_genesis_only_is_valid() {
        let signer = make_test_signer();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_block(&Block::genesis(&GenesisDescriptor::default(), &signer))
            .await
            .unwrap();

        let report = make_validator(store, &signer).validate().await.unwrap();
        assert!(report.is_valid);
        assert_eq!(report.blocks_checked, 1);
        assert_eq!(report.entries_checked, 0);
    }

    #[tokio::test]
    async fn test_pending_entry_tamper_detected() {
        let signer = make_test_signer();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_block(&Block::genesis(&GenesisDescriptor::default(), &signer))
            .await
            .unwrap();
        let entry = EntryBuilder::new(EventType::parse("user.login").unwrap(), json!({"u": 1}))
            .signer_id("primary")
            .build();
        store.insert_entry(&entry).await.unwrap();

        store
            .tamper_entries(|entries| entries[0].timestamp += 1)
            .unwrap();

        let report = make_validator(store, &signer).validate().await.unwrap();
        assert_eq!(report.violations.len(), 1);
        assert!(matches!(
            report.violations[0].reason,
            ViolationReason::EntryHashMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_store_reports_nothing() {
        let signer = make_test_signer();
        let report = make_validator(Arc::new(MemoryStore::new()), &signer)
            .validate()
            .await
            .unwrap();
        assert!(report.is_valid);
        assert_eq!(report.blocks_checked, 0);
    }
}

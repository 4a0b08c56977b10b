//! Error types for the audit chain core.

use thiserror::Error;

/// Core errors that can occur while building or checking ledger records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid event type {input:?}: {reason}")]
    InvalidEventType { input: String, reason: &'static str },

    #[error("key material error: {0}")]
    Key(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

//! The ledger's signing authority.
//!
//! A [`Signer`] pairs a process-lifetime keypair with the authority id that
//! is stamped on every entry and block it produces.

use std::path::Path;

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;

/// Signs block hashes and verifies historical signatures.
#[derive(Clone, Debug)]
pub struct Signer {
    keypair: Keypair,
    signer_id: String,
}

impl Signer {
    /// Wrap an existing keypair.
    pub fn from_keypair(keypair: Keypair, signer_id: impl Into<String>) -> Self {
        Self {
            keypair,
            signer_id: signer_id.into(),
        }
    }

    /// Create a signer with a freshly generated key.
    pub fn generate(signer_id: impl Into<String>) -> Self {
        Self::from_keypair(Keypair::generate(), signer_id)
    }

    /// Load the signing key from `seed_path`, creating it on first start.
    ///
    /// A present but unreadable or malformed seed file is an error; the
    /// ledger must not silently rotate its key.
    pub fn load_or_generate(
        seed_path: impl AsRef<Path>,
        signer_id: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let seed_path = seed_path.as_ref();
        let keypair = if seed_path.exists() {
            Keypair::load_seed_file(seed_path)?
        } else {
            let keypair = Keypair::generate();
            keypair.save_seed_file(seed_path)?;
            keypair
        };
        Ok(Self::from_keypair(keypair, signer_id))
    }

    /// Authority id stamped on records.
    pub fn signer_id(&self) -> &str {
        &self.signer_id
    }

    /// The local public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Sign a byte string.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.keypair.sign(message)
    }

    /// Verify a signature, against the local key unless `public_key` is given.
    pub fn verify(
        &self,
        message: &[u8],
        signature: &Ed25519Signature,
        public_key: Option<&Ed25519PublicKey>,
    ) -> bool {
        let key = public_key.copied().unwrap_or_else(|| self.public_key());
        key.verify(message, signature).is_ok()
    }
}

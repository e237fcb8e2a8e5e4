//! Offline signing packages
//!
//! A session whose hashes have all been received can be exported as a
//! [`SigningPackage`], carried to a machine holding the keys, signed there and
//! brought back as a [`SignedPackage`]. Only hashes travel to the signer.

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    data_structures::{
        Address, CanonicalTxBytes, FixedHash, SignatureEntry, SighashType, TransactionDraft,
    },
    errors::{DraftError, DraftResult},
    signing::{
        models::types::{get_supported_version, HasVersion, VersionedDocument},
        signer::HashSigner,
    },
};

/// One hash awaiting a signature
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningRequest {
    pub input_index: u32,
    /// Owner of the consumed input; the key expected to sign
    pub signer: Address,
    pub hash: FixedHash,
    pub sighash_type: SighashType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SigningPackage {
    pub version: Version,
    pub draft: TransactionDraft,
    pub canonical_unsigned_tx: CanonicalTxBytes,
    pub requests: Vec<SigningRequest>,
}

impl VersionedDocument for SigningPackage {}

impl HasVersion for SigningPackage {
    fn get_version(&self) -> &Version {
        &self.version
    }
}

impl SigningPackage {
    pub fn new(
        draft: TransactionDraft,
        canonical_unsigned_tx: CanonicalTxBytes,
        requests: Vec<SigningRequest>,
    ) -> Self {
        Self {
            version: get_supported_version(),
            draft,
            canonical_unsigned_tx,
            requests,
        }
    }

    /// Digest binding a signed package back to this package
    pub fn canonical_digest(&self) -> FixedHash {
        FixedHash::digest(self.canonical_unsigned_tx.as_bytes())
    }

    /// Sign every request addressed to `signer`'s key
    pub fn sign_with(&self, signer: &dyn HashSigner) -> DraftResult<SignedPackage> {
        let address = signer.address();
        let mut signatures = Vec::new();
        for request in self.requests.iter().filter(|r| r.signer == address) {
            signatures.push(SignatureEntry {
                input_index: request.input_index,
                sighash_type: request.sighash_type,
                public_key: signer.public_key(),
                signature: signer.sign_hash(&request.hash)?,
            });
        }
        if signatures.is_empty() {
            return Err(DraftError::Signing(format!(
                "no signing request is addressed to {address}"
            )));
        }
        debug!(signer = %address, count = signatures.len(), "Signed package requests");
        Ok(SignedPackage {
            version: get_supported_version(),
            canonical_digest: self.canonical_digest(),
            signatures,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPackage {
    pub version: Version,
    pub canonical_digest: FixedHash,
    pub signatures: Vec<SignatureEntry>,
}

impl VersionedDocument for SignedPackage {}

impl HasVersion for SignedPackage {
    fn get_version(&self) -> &Version {
        &self.version
    }
}

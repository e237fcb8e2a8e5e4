//! Request/response shapes of the signing exchange and submission

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::{
    transaction_output::RawOutput,
    types::{FixedHash, PublicKeyBytes, SignatureBytes},
};
use crate::hex_utils::serde_bytes_hex;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SighashType {
    /// Commit to every input and output
    #[default]
    All,
    /// Commit to every input and the output at the same index
    Single,
}

impl SighashType {
    pub fn as_byte(&self) -> u8 {
        match self {
            SighashType::All => 0x01,
            SighashType::Single => 0x03,
        }
    }
}

/// The ledger's canonical unsigned transaction form. Must be passed back to
/// finalize unmodified; it is never recomputed locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CanonicalTxBytes(#[serde(with = "serde_bytes_hex")] Vec<u8>);

impl CanonicalTxBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureHashResponse {
    pub hash: FixedHash,
    pub canonical_unsigned_tx: CanonicalTxBytes,
}

/// One signature per consumed input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SignatureEntry {
    pub input_index: u32,
    pub sighash_type: SighashType,
    pub public_key: PublicKeyBytes,
    pub signature: SignatureBytes,
}

/// Opaque signed transaction bytes, submittable once
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedTransaction(#[serde(with = "serde_bytes_hex")] Vec<u8>);

impl FinalizedTransaction {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub tx_hash: FixedHash,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A transaction as recorded by the ledger after confirmation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    pub tx_hash: FixedHash,
    pub block_height: u64,
    pub outputs: Vec<RawOutput>,
}

//! The remote ledger boundary
//!
//! The pipeline consumes the ledger exclusively through [`LedgerRpc`]. The
//! ledger validates, canonicalizes and hashes; this crate only prepares
//! requests and consumes responses.

#[cfg(feature = "http")]
pub mod http;
pub mod mocks;

use async_trait::async_trait;

use crate::{
    data_structures::{
        Address, CanonicalTxBytes, ConfirmedTransaction, FinalizedTransaction, FixedHash,
        SignatureEntry, SignatureHashResponse, SighashType, SpendableOutput, SubmitResponse,
        TokenId, TransactionDraft,
    },
    errors::DraftResult,
};

#[cfg(feature = "http")]
pub use http::HttpLedgerClient;
pub use mocks::{MockLedger, MockLedgerFailureModes};

/// Request/response shapes the core exchanges with the remote ledger
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Spendable outputs owned by `owner`, filtered to `token_id` (native when `None`)
    async fn query_utxos(
        &self,
        owner: &Address,
        token_id: Option<&TokenId>,
    ) -> DraftResult<Vec<SpendableOutput>>;

    /// Sighash for one input plus the ledger's canonical unsigned bytes
    async fn compute_signature_hash(
        &self,
        draft: &TransactionDraft,
        input_index: u32,
        sighash_type: SighashType,
    ) -> DraftResult<SignatureHashResponse>;

    /// Combine draft, canonical bytes and signatures into submittable bytes
    async fn finalize_transaction(
        &self,
        draft: &TransactionDraft,
        canonical_unsigned_tx: &CanonicalTxBytes,
        signatures: &[SignatureEntry],
    ) -> DraftResult<FinalizedTransaction>;

    async fn submit_transaction(
        &self,
        finalized: &FinalizedTransaction,
    ) -> DraftResult<SubmitResponse>;

    /// `Ok(None)` when the ledger does not know the transaction
    async fn fetch_transaction(
        &self,
        tx_hash: &FixedHash,
    ) -> DraftResult<Option<ConfirmedTransaction>>;
}

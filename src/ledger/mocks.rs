//! In-memory ledger for deterministic testing
//!
//! Canonicalizes drafts with borsh, hashes with Blake2b-256, verifies Schnorr
//! signatures on finalize and detects double spends on submit. Failure modes
//! let tests simulate protocol drift, rejections and slow calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};

use super::LedgerRpc;
use crate::{
    data_structures::{
        Address, CanonicalTxBytes, ConfirmedTransaction, FinalizedTransaction, FixedHash,
        Outpoint, Output, RawOutput, SignatureEntry, SignatureHashResponse, SighashType,
        SpendableOutput, SubmitResponse, TokenId, TransactionDraft,
    },
    errors::{DraftResult, LedgerError, SerializationError},
    signing::signer::verify_hash_signature,
};

/// Simulated failure conditions
#[derive(Debug, Clone, Default)]
pub struct MockLedgerFailureModes {
    /// Every call fails as if the ledger were unreachable
    pub unreachable: bool,
    /// Canonical bytes returned for this input index and above differ from the rest
    pub canonical_drift_from_input: Option<u32>,
    /// Finalize fails with this message
    pub fail_finalize: Option<String>,
    /// Submissions are rejected with this reason
    pub reject_submissions: Option<String>,
    /// Delay applied to every hash computation
    pub hash_delay: Option<Duration>,
    /// Delay applied to every UTXO query
    pub query_delay: Option<Duration>,
}

/// Number of calls received per boundary operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCallCounts {
    pub query_utxos: usize,
    pub compute_signature_hash: usize,
    pub finalize_transaction: usize,
    pub submit_transaction: usize,
    pub fetch_transaction: usize,
}

#[derive(Debug, Default)]
struct MockLedgerState {
    utxos: Vec<SpendableOutput>,
    spent: HashSet<Outpoint>,
    transactions: HashMap<FixedHash, ConfirmedTransaction>,
    tip_height: u64,
    next_funding_tx: u64,
    calls: MockCallCounts,
    failure_modes: MockLedgerFailureModes,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct FinalizedEnvelope {
    canonical: Vec<u8>,
    signatures: Vec<SignatureEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<MockLedgerState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockLedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fund `owner` with a fresh output; returns its outpoint
    pub fn add_utxo(&self, owner: Address, amount: u64, token_id: Option<TokenId>) -> Outpoint {
        let mut state = self.state();
        state.next_funding_tx += 1;
        let tx_hash = FixedHash::digest(&state.next_funding_tx.to_le_bytes());
        let outpoint = Outpoint::new(tx_hash, 0);
        let block_height = state.tip_height;
        state.utxos.push(SpendableOutput {
            outpoint,
            owner,
            amount,
            token_id,
            block_height,
        });
        outpoint
    }

    /// Unspent outputs currently held by `owner`, any token
    pub fn utxos_of(&self, owner: &Address) -> Vec<SpendableOutput> {
        self.state()
            .utxos
            .iter()
            .filter(|u| &u.owner == owner)
            .cloned()
            .collect()
    }

    /// Record a confirmed transaction directly, bypassing submission
    pub fn insert_transaction(&self, transaction: ConfirmedTransaction) {
        self.state()
            .transactions
            .insert(transaction.tx_hash, transaction);
    }

    pub fn set_failure_modes(&self, modes: MockLedgerFailureModes) {
        self.state().failure_modes = modes;
    }

    pub fn call_counts(&self) -> MockCallCounts {
        self.state().calls
    }

    pub fn tip_height(&self) -> u64 {
        self.state().tip_height
    }

    fn failure_modes(&self) -> MockLedgerFailureModes {
        self.state().failure_modes.clone()
    }

    fn check_reachable(&self) -> DraftResult<()> {
        if self.state().failure_modes.unreachable {
            return Err(LedgerError::Unreachable("mock ledger offline".into()).into());
        }
        Ok(())
    }

    fn canonicalize(draft: &TransactionDraft) -> DraftResult<Vec<u8>> {
        borsh::to_vec(draft)
            .map_err(|e| SerializationError::BorshSerializationError(e.to_string()).into())
    }

    fn sighash(canonical: &[u8], input_index: u32, sighash_type: SighashType) -> FixedHash {
        let mut preimage = canonical.to_vec();
        preimage.extend_from_slice(&input_index.to_le_bytes());
        preimage.push(sighash_type.as_byte());
        FixedHash::digest(&preimage)
    }

    fn bad_request(message: impl Into<String>) -> LedgerError {
        LedgerError::Remote {
            status: 400,
            message: message.into(),
        }
    }

    fn verify_signatures(
        draft: &TransactionDraft,
        canonical: &[u8],
        signatures: &[SignatureEntry],
    ) -> Result<(), LedgerError> {
        let consumed: HashSet<u32> = draft.consumed_input_indices().into_iter().collect();
        let mut seen = HashSet::new();
        for entry in signatures {
            if !consumed.contains(&entry.input_index) {
                return Err(Self::bad_request(format!(
                    "signature for non-consumed input {}",
                    entry.input_index
                )));
            }
            if !seen.insert(entry.input_index) {
                return Err(Self::bad_request(format!(
                    "duplicate signature for input {}",
                    entry.input_index
                )));
            }
            let hash = Self::sighash(canonical, entry.input_index, entry.sighash_type);
            if !verify_hash_signature(&entry.public_key, &hash, &entry.signature) {
                return Err(Self::bad_request(format!(
                    "invalid signature for input {}",
                    entry.input_index
                )));
            }
            let owner = draft.inputs()[entry.input_index as usize].owner;
            if entry.public_key.to_address() != owner {
                return Err(Self::bad_request(format!(
                    "input {} is not owned by the signing key",
                    entry.input_index
                )));
            }
        }
        if let Some(missing) = consumed.iter().find(|i| !seen.contains(i)) {
            return Err(Self::bad_request(format!(
                "missing signature for input {missing}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn query_utxos(
        &self,
        owner: &Address,
        token_id: Option<&TokenId>,
    ) -> DraftResult<Vec<SpendableOutput>> {
        self.check_reachable()?;
        if let Some(delay) = self.failure_modes().query_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.calls.query_utxos += 1;
        Ok(state
            .utxos
            .iter()
            .filter(|u| &u.owner == owner && u.matches_token(token_id))
            .filter(|u| !state.spent.contains(&u.outpoint))
            .cloned()
            .collect())
    }

    async fn compute_signature_hash(
        &self,
        draft: &TransactionDraft,
        input_index: u32,
        sighash_type: SighashType,
    ) -> DraftResult<SignatureHashResponse> {
        self.check_reachable()?;
        let modes = self.failure_modes();
        if let Some(delay) = modes.hash_delay {
            tokio::time::sleep(delay).await;
        }
        self.state().calls.compute_signature_hash += 1;

        match draft.inputs().get(input_index as usize) {
            Some(input) if input.is_consumed() => {}
            _ => {
                return Err(Self::bad_request(format!(
                    "input {input_index} is not a consumed input"
                ))
                .into())
            }
        }

        let mut canonical = Self::canonicalize(draft)?;
        let hash = Self::sighash(&canonical, input_index, sighash_type);
        if matches!(modes.canonical_drift_from_input, Some(from) if input_index >= from) {
            canonical.push(0xff);
        }
        Ok(SignatureHashResponse {
            hash,
            canonical_unsigned_tx: CanonicalTxBytes::new(canonical),
        })
    }

    async fn finalize_transaction(
        &self,
        draft: &TransactionDraft,
        canonical_unsigned_tx: &CanonicalTxBytes,
        signatures: &[SignatureEntry],
    ) -> DraftResult<FinalizedTransaction> {
        self.check_reachable()?;
        let modes = self.failure_modes();
        self.state().calls.finalize_transaction += 1;
        if let Some(message) = modes.fail_finalize {
            return Err(Self::bad_request(message).into());
        }

        let canonical = Self::canonicalize(draft)?;
        if canonical.as_slice() != canonical_unsigned_tx.as_bytes() {
            return Err(Self::bad_request("canonical bytes do not match draft").into());
        }
        Self::verify_signatures(draft, &canonical, signatures)?;

        let envelope = FinalizedEnvelope {
            canonical,
            signatures: signatures.to_vec(),
        };
        let bytes = borsh::to_vec(&envelope)
            .map_err(|e| SerializationError::BorshSerializationError(e.to_string()))?;
        Ok(FinalizedTransaction::new(bytes))
    }

    async fn submit_transaction(
        &self,
        finalized: &FinalizedTransaction,
    ) -> DraftResult<SubmitResponse> {
        self.check_reachable()?;
        let envelope = FinalizedEnvelope::try_from_slice(finalized.as_bytes())
            .map_err(|e| SerializationError::BorshDeserializationError(e.to_string()))?;
        let draft = TransactionDraft::try_from_slice(&envelope.canonical)
            .map_err(|e| SerializationError::BorshDeserializationError(e.to_string()))?;
        let tx_hash = FixedHash::digest(&envelope.canonical);

        let mut state = self.state();
        state.calls.submit_transaction += 1;
        let rejected = |reason: String| SubmitResponse {
            accepted: false,
            tx_hash,
            reason: Some(reason),
        };

        if let Some(reason) = state.failure_modes.reject_submissions.clone() {
            return Ok(rejected(reason));
        }
        let consumed: Vec<Outpoint> = draft
            .inputs()
            .iter()
            .filter(|i| i.is_consumed())
            .map(|i| i.outpoint)
            .collect();
        for outpoint in &consumed {
            let unspent = state.utxos.iter().any(|u| &u.outpoint == outpoint)
                && !state.spent.contains(outpoint);
            if !unspent {
                return Ok(rejected(format!("double spend of {outpoint}")));
            }
        }

        state.tip_height += 1;
        let block_height = state.tip_height;
        for outpoint in &consumed {
            state.spent.insert(*outpoint);
        }
        state.utxos.retain(|u| !consumed.contains(&u.outpoint));
        for (index, output) in draft.outputs().iter().enumerate() {
            if let Output::Asset(asset) = output {
                state.utxos.push(SpendableOutput {
                    outpoint: Outpoint::new(tx_hash, index as u32),
                    owner: asset.owner,
                    amount: asset.amount,
                    token_id: asset.token_id.clone(),
                    block_height,
                });
            }
        }
        state.transactions.insert(
            tx_hash,
            ConfirmedTransaction {
                tx_hash,
                block_height,
                outputs: draft.outputs().iter().map(RawOutput::from).collect(),
            },
        );

        Ok(SubmitResponse {
            accepted: true,
            tx_hash,
            reason: None,
        })
    }

    async fn fetch_transaction(
        &self,
        tx_hash: &FixedHash,
    ) -> DraftResult<Option<ConfirmedTransaction>> {
        self.check_reachable()?;
        let mut state = self.state();
        state.calls.fetch_transaction += 1;
        Ok(state.transactions.get(tx_hash).cloned())
    }
}

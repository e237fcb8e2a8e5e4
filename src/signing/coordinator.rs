//! Three-phase signing: compute-hash, sign-hash, finalize
//!
//! [`SigningSession`] is the per-draft state machine and is purely local.
//! [`SignatureCoordinator`] drives a session against the ledger, honoring the
//! caller's [`CallContext`] at every boundary. Any failure aborts the session;
//! a retry starts from a forked draft.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{
    common::CallContext,
    data_structures::{
        CanonicalTxBytes, FinalizedTransaction, FixedHash, SignatureEntry, SignatureHashResponse,
        SighashType, SubmitResponse, TransactionDraft,
    },
    errors::{DraftError, DraftResult},
    ledger::LedgerRpc,
    signing::{
        models::signing_package::{SignedPackage, SigningPackage, SigningRequest},
        signer::HashSigner,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningState {
    Composed,
    HashRequested,
    HashReceived,
    Signed,
    FinalizeRequested,
    Finalized,
    Submitted,
    Aborted,
}

impl SigningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningState::Composed => "composed",
            SigningState::HashRequested => "hash_requested",
            SigningState::HashReceived => "hash_received",
            SigningState::Signed => "signed",
            SigningState::FinalizeRequested => "finalize_requested",
            SigningState::Finalized => "finalized",
            SigningState::Submitted => "submitted",
            SigningState::Aborted => "aborted",
        }
    }
}

impl Display for SigningState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every consumed input appears exactly once, and nothing else appears
pub fn check_signature_completeness(
    consumed: &[u32],
    entries: &[SignatureEntry],
) -> DraftResult<()> {
    let consumed: BTreeSet<u32> = consumed.iter().copied().collect();
    let mut seen = BTreeSet::new();
    for entry in entries {
        if !consumed.contains(&entry.input_index) {
            return Err(DraftError::UnexpectedSignature {
                input_index: entry.input_index,
            });
        }
        if !seen.insert(entry.input_index) {
            return Err(DraftError::DuplicateSignature {
                input_index: entry.input_index,
            });
        }
    }
    match consumed.difference(&seen).next() {
        Some(&input_index) => Err(DraftError::MissingSignature { input_index }),
        None => Ok(()),
    }
}

/// Signing state for one draft
#[derive(Debug)]
pub struct SigningSession {
    draft: TransactionDraft,
    sighash_type: SighashType,
    state: SigningState,
    canonical: Option<CanonicalTxBytes>,
    hashes: BTreeMap<u32, FixedHash>,
    signatures: BTreeMap<u32, SignatureEntry>,
    finalized: Option<FinalizedTransaction>,
    tx_hash: Option<FixedHash>,
}

impl SigningSession {
    /// Start a session. A frozen draft already belongs to another session.
    pub fn new(draft: TransactionDraft, sighash_type: SighashType) -> DraftResult<Self> {
        if draft.is_frozen() {
            return Err(DraftError::DraftFrozen);
        }
        Ok(Self {
            draft,
            sighash_type,
            state: SigningState::Composed,
            canonical: None,
            hashes: BTreeMap::new(),
            signatures: BTreeMap::new(),
            finalized: None,
            tx_hash: None,
        })
    }

    pub fn draft(&self) -> &TransactionDraft {
        &self.draft
    }

    pub fn state(&self) -> SigningState {
        self.state
    }

    pub fn sighash_type(&self) -> SighashType {
        self.sighash_type
    }

    pub fn canonical_unsigned_tx(&self) -> Option<&CanonicalTxBytes> {
        self.canonical.as_ref()
    }

    pub fn tx_hash(&self) -> Option<FixedHash> {
        self.tx_hash
    }

    /// Collected signatures in input order
    pub fn signatures(&self) -> Vec<SignatureEntry> {
        self.signatures.values().cloned().collect()
    }

    /// Unfrozen copy of the draft for a fresh session
    pub fn fork_draft(&self) -> TransactionDraft {
        self.draft.fork()
    }

    pub fn hash_for(&self, input_index: u32) -> DraftResult<FixedHash> {
        self.hashes
            .get(&input_index)
            .copied()
            .ok_or(DraftError::HashNotRequested { input_index })
    }

    fn is_consumed(&self, input_index: u32) -> bool {
        self.draft
            .inputs()
            .get(input_index as usize)
            .is_some_and(|input| input.is_consumed())
    }

    fn consumed_count(&self) -> usize {
        self.draft.consumed_input_indices().len()
    }

    fn ensure_state(&self, allowed: &[SigningState], expected: &'static str) -> DraftResult<()> {
        if self.state == SigningState::Aborted {
            return Err(DraftError::SessionAborted);
        }
        if !allowed.contains(&self.state) {
            return Err(DraftError::InvalidState {
                expected,
                actual: self.state.as_str(),
            });
        }
        Ok(())
    }

    /// Abort the session and hand the error back for propagation
    pub fn fail(&mut self, err: DraftError) -> DraftError {
        if self.state != SigningState::Aborted {
            if err.is_protocol_error() {
                error!(
                    draft_id = self.draft.draft_id(),
                    state = %self.state,
                    error = %err,
                    "Protocol error, aborting signing session"
                );
            } else {
                warn!(
                    draft_id = self.draft.draft_id(),
                    state = %self.state,
                    error = %err,
                    "Aborting signing session"
                );
            }
            self.state = SigningState::Aborted;
        }
        err
    }

    /// Freeze the draft and list the inputs needing a hash
    pub fn begin_hashing(&mut self) -> DraftResult<Vec<u32>> {
        self.ensure_state(&[SigningState::Composed], "composed")?;
        let consumed = self.draft.consumed_input_indices();
        if consumed.is_empty() {
            let err = DraftError::invalid_argument(
                "draft",
                self.draft.summary(),
                "draft has no consumed inputs to sign",
            );
            return Err(self.fail(err));
        }
        self.draft.freeze();
        self.state = SigningState::HashRequested;
        debug!(
            draft_id = self.draft.draft_id(),
            inputs = ?consumed,
            "Draft frozen, requesting signature hashes"
        );
        Ok(consumed)
    }

    pub fn record_hash(
        &mut self,
        input_index: u32,
        response: SignatureHashResponse,
    ) -> DraftResult<()> {
        self.ensure_state(&[SigningState::HashRequested], "hash_requested")?;
        if !self.is_consumed(input_index) {
            let err =
                DraftError::invalid_argument("input_index", input_index, "not a consumed input");
            return Err(self.fail(err));
        }
        if self.hashes.contains_key(&input_index) {
            let err = DraftError::invalid_argument(
                "input_index",
                input_index,
                "signature hash already received",
            );
            return Err(self.fail(err));
        }
        let mismatch = self
            .canonical
            .as_ref()
            .is_some_and(|first| first != &response.canonical_unsigned_tx);
        if mismatch {
            return Err(self.fail(DraftError::CanonicalizationMismatch { input_index }));
        }
        if self.canonical.is_none() {
            self.canonical = Some(response.canonical_unsigned_tx);
        }

        debug!(
            draft_id = self.draft.draft_id(),
            input_index,
            hash = %response.hash,
            "Received signature hash"
        );
        self.hashes.insert(input_index, response.hash);
        if self.hashes.len() == self.consumed_count() {
            self.state = SigningState::HashReceived;
        }
        Ok(())
    }

    pub fn add_signature(&mut self, entry: SignatureEntry) -> DraftResult<()> {
        self.ensure_state(&[SigningState::HashReceived], "hash_received")?;
        let input_index = entry.input_index;
        if !self.is_consumed(input_index) {
            return Err(self.fail(DraftError::UnexpectedSignature { input_index }));
        }
        if !self.hashes.contains_key(&input_index) {
            return Err(self.fail(DraftError::HashNotRequested { input_index }));
        }
        if self.signatures.contains_key(&input_index) {
            return Err(self.fail(DraftError::DuplicateSignature { input_index }));
        }
        if entry.sighash_type != self.sighash_type {
            let err = DraftError::invalid_argument(
                "sighash_type",
                format!("{:?}", entry.sighash_type),
                format!("session signs with {:?}", self.sighash_type),
            );
            return Err(self.fail(err));
        }

        self.signatures.insert(input_index, entry);
        if self.signatures.len() == self.consumed_count() {
            self.state = SigningState::Signed;
        }
        Ok(())
    }

    /// Sign every hashed input owned by `signer`; returns how many were signed
    pub fn sign_with(&mut self, signer: &dyn HashSigner) -> DraftResult<usize> {
        self.ensure_state(&[SigningState::HashReceived], "hash_received")?;
        let address = signer.address();
        let pending: Vec<(u32, FixedHash)> = self
            .hashes
            .iter()
            .filter(|(index, _)| !self.signatures.contains_key(*index))
            .filter(|(index, _)| self.draft.inputs()[**index as usize].owner == address)
            .map(|(index, hash)| (*index, *hash))
            .collect();
        if pending.is_empty() {
            let err = DraftError::Signing(format!("{address} owns none of the unsigned inputs"));
            return Err(self.fail(err));
        }

        for (input_index, hash) in &pending {
            let signature = match signer.sign_hash(hash) {
                Ok(signature) => signature,
                Err(e) => return Err(self.fail(e)),
            };
            self.add_signature(SignatureEntry {
                input_index: *input_index,
                sighash_type: self.sighash_type,
                public_key: signer.public_key(),
                signature,
            })?;
        }
        debug!(
            draft_id = self.draft.draft_id(),
            signer = %address,
            signed = pending.len(),
            "Signed hashes locally"
        );
        Ok(pending.len())
    }

    /// Hash requests for an offline signer
    pub fn export_package(&self) -> DraftResult<SigningPackage> {
        self.ensure_state(&[SigningState::HashReceived], "hash_received")?;
        let canonical = self.canonical.clone().ok_or(DraftError::InvalidState {
            expected: "hash_received",
            actual: self.state.as_str(),
        })?;
        let requests = self
            .hashes
            .iter()
            .map(|(index, hash)| SigningRequest {
                input_index: *index,
                signer: self.draft.inputs()[*index as usize].owner,
                hash: *hash,
                sighash_type: self.sighash_type,
            })
            .collect();
        Ok(SigningPackage::new(self.draft.clone(), canonical, requests))
    }

    /// Attach signatures produced offline for this session's package
    pub fn attach_signed_package(&mut self, signed: SignedPackage) -> DraftResult<()> {
        self.ensure_state(&[SigningState::HashReceived], "hash_received")?;
        let expected = self
            .canonical
            .as_ref()
            .map(|c| FixedHash::digest(c.as_bytes()));
        if expected != Some(signed.canonical_digest) {
            let err = DraftError::invalid_argument(
                "canonical_digest",
                signed.canonical_digest,
                "signed package does not belong to this session",
            );
            return Err(self.fail(err));
        }
        for entry in signed.signatures {
            self.add_signature(entry)?;
        }
        Ok(())
    }

    /// Check `entries` and move to finalize; returns the bytes to pass back unmodified
    pub fn begin_finalize(&mut self, entries: &[SignatureEntry]) -> DraftResult<CanonicalTxBytes> {
        self.ensure_state(
            &[SigningState::HashReceived, SigningState::Signed],
            "signed",
        )?;
        let consumed = self.draft.consumed_input_indices();
        if let Err(err) = check_signature_completeness(&consumed, entries) {
            return Err(self.fail(err));
        }
        let canonical = match self.canonical.clone() {
            Some(canonical) => canonical,
            None => {
                let err = DraftError::HashNotRequested {
                    input_index: consumed[0],
                };
                return Err(self.fail(err));
            }
        };
        self.state = SigningState::FinalizeRequested;
        Ok(canonical)
    }

    pub fn record_finalized(&mut self, finalized: FinalizedTransaction) -> DraftResult<()> {
        self.ensure_state(&[SigningState::FinalizeRequested], "finalize_requested")?;
        self.finalized = Some(finalized);
        self.state = SigningState::Finalized;
        Ok(())
    }

    /// Finalized bytes ready for submission
    pub fn finalized(&self) -> DraftResult<&FinalizedTransaction> {
        self.ensure_state(&[SigningState::Finalized], "finalized")?;
        self.finalized.as_ref().ok_or(DraftError::InvalidState {
            expected: "finalized",
            actual: self.state.as_str(),
        })
    }

    pub fn record_submission(&mut self, response: SubmitResponse) -> DraftResult<FixedHash> {
        self.ensure_state(&[SigningState::Finalized], "finalized")?;
        if !response.accepted {
            let reason = response
                .reason
                .unwrap_or_else(|| "no reason given".to_string());
            return Err(self.fail(DraftError::TransactionRejected { reason }));
        }
        self.tx_hash = Some(response.tx_hash);
        self.state = SigningState::Submitted;
        Ok(response.tx_hash)
    }
}

type HashedPair = (u32, SignatureHashResponse, Option<SignatureEntry>);

/// Drives signing sessions against the ledger
pub struct SignatureCoordinator {
    ledger: Arc<dyn LedgerRpc>,
    parallel_signing: bool,
}

impl SignatureCoordinator {
    pub fn new(ledger: Arc<dyn LedgerRpc>, parallel_signing: bool) -> Self {
        Self {
            ledger,
            parallel_signing,
        }
    }

    /// Request a hash for every consumed input
    pub async fn request_hashes(
        &self,
        session: &mut SigningSession,
        ctx: &CallContext,
    ) -> DraftResult<()> {
        let indices = session.begin_hashing()?;
        let sighash_type = session.sighash_type();

        if self.parallel_signing && indices.len() > 1 {
            let pairs = self
                .hash_concurrently(session.draft(), &indices, sighash_type, None, ctx)
                .await;
            let pairs = pairs.map_err(|e| session.fail(e))?;
            for (input_index, response, _) in pairs {
                session.record_hash(input_index, response)?;
            }
            return Ok(());
        }

        for input_index in indices {
            let result = ctx
                .run(
                    "compute_signature_hash",
                    self.ledger
                        .compute_signature_hash(session.draft(), input_index, sighash_type),
                )
                .await;
            let response = result.map_err(|e| session.fail(e))?;
            session.record_hash(input_index, response)?;
        }
        Ok(())
    }

    /// Hash and sign every consumed input with one signer
    pub async fn hash_and_sign(
        &self,
        session: &mut SigningSession,
        signer: Arc<dyn HashSigner>,
        ctx: &CallContext,
    ) -> DraftResult<()> {
        let address = signer.address();
        let foreign = session
            .draft()
            .inputs()
            .iter()
            .position(|input| input.is_consumed() && input.owner != address);
        if let Some(input_index) = foreign {
            let err = DraftError::Signing(format!(
                "input {input_index} is not owned by signer {address}"
            ));
            return Err(session.fail(err));
        }

        if !self.parallel_signing || session.draft().consumed_input_indices().len() < 2 {
            self.request_hashes(session, ctx).await?;
            session.sign_with(signer.as_ref())?;
            return Ok(());
        }

        let indices = session.begin_hashing()?;
        let sighash_type = session.sighash_type();
        let pairs = self
            .hash_concurrently(session.draft(), &indices, sighash_type, Some(signer), ctx)
            .await;
        let pairs = pairs.map_err(|e| session.fail(e))?;

        // Join barrier: every pair has completed before anything is recorded
        let mut entries = Vec::with_capacity(pairs.len());
        for (input_index, response, entry) in pairs {
            session.record_hash(input_index, response)?;
            entries.extend(entry);
        }
        for entry in entries {
            session.add_signature(entry)?;
        }
        debug!(
            draft_id = session.draft().draft_id(),
            signed = indices.len(),
            "Signed hashes concurrently"
        );
        Ok(())
    }

    async fn hash_concurrently(
        &self,
        draft: &TransactionDraft,
        indices: &[u32],
        sighash_type: SighashType,
        signer: Option<Arc<dyn HashSigner>>,
        ctx: &CallContext,
    ) -> DraftResult<Vec<HashedPair>> {
        let draft = Arc::new(draft.clone());
        let mut tasks = JoinSet::new();
        for &input_index in indices {
            let ledger = self.ledger.clone();
            let draft = draft.clone();
            let signer = signer.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let response = ctx
                    .run(
                        "compute_signature_hash",
                        ledger.compute_signature_hash(&draft, input_index, sighash_type),
                    )
                    .await?;
                let entry = match signer {
                    Some(signer) => Some(SignatureEntry {
                        input_index,
                        sighash_type,
                        public_key: signer.public_key(),
                        signature: signer.sign_hash(&response.hash)?,
                    }),
                    None => None,
                };
                Ok::<HashedPair, DraftError>((input_index, response, entry))
            });
        }

        let mut pairs = Vec::with_capacity(indices.len());
        while let Some(joined) = tasks.join_next().await {
            let pair = joined
                .map_err(|e| DraftError::Signing(format!("signing task failed: {e}")))??;
            pairs.push(pair);
        }
        pairs.sort_by_key(|(input_index, _, _)| *input_index);
        Ok(pairs)
    }

    /// Finalize with the signatures collected in the session
    pub async fn finalize(
        &self,
        session: &mut SigningSession,
        ctx: &CallContext,
    ) -> DraftResult<FinalizedTransaction> {
        let entries = session.signatures();
        self.finalize_with(session, &entries, ctx).await
    }

    /// Finalize with caller-supplied entries; their order is irrelevant
    pub async fn finalize_with(
        &self,
        session: &mut SigningSession,
        entries: &[SignatureEntry],
        ctx: &CallContext,
    ) -> DraftResult<FinalizedTransaction> {
        let canonical = session.begin_finalize(entries)?;
        let result = ctx
            .run(
                "finalize_transaction",
                self.ledger
                    .finalize_transaction(session.draft(), &canonical, entries),
            )
            .await;
        let finalized = result.map_err(|e| session.fail(e))?;
        session.record_finalized(finalized.clone())?;
        info!(
            draft_id = session.draft().draft_id(),
            signatures = entries.len(),
            bytes = finalized.as_bytes().len(),
            "Transaction finalized"
        );
        Ok(finalized)
    }

    pub async fn submit(
        &self,
        session: &mut SigningSession,
        ctx: &CallContext,
    ) -> DraftResult<FixedHash> {
        let finalized = session.finalized()?.clone();
        let response = ctx
            .run(
                "submit_transaction",
                self.ledger.submit_transaction(&finalized),
            )
            .await
            .map_err(|e| session.fail(e))?;
        let tx_hash = session.record_submission(response)?;
        info!(
            draft_id = session.draft().draft_id(),
            tx_hash = %tx_hash,
            "Transaction submitted"
        );
        Ok(tx_hash)
    }
}

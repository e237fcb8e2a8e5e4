//! End-to-end draft pipeline: compose, hash, sign, finalize, submit
//!
//! [`DraftPipeline`] is generic over the operation's [`Composer`]; every
//! business operation runs through the same strictly sequential flow. The
//! UTXO reservation guard is held from input selection until submission
//! finishes or fails.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    common::CallContext,
    config::PipelineConfig,
    data_structures::{FixedHash, TransactionDraft},
    errors::DraftResult,
    extraction::{BusinessResult, Expectation, ResultExtractor},
    ledger::LedgerRpc,
    signing::{
        coordinator::{SignatureCoordinator, SigningSession},
        models::signing_package::{SignedPackage, SigningPackage},
        prepare::composer::{Composer, DraftComposer},
        reservation::{ReservationGuard, UnreservedUtxos, UtxoReservation},
        signer::HashSigner,
    },
};

/// A submitted draft
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub tx_hash: FixedHash,
    pub fee: u64,
    pub draft: TransactionDraft,
}

/// A hashed draft waiting for offline signatures
///
/// Keeps the address reservation until it is completed or dropped.
#[derive(Debug)]
pub struct PreparedDraft {
    pub session: SigningSession,
    pub package: SigningPackage,
    guard: ReservationGuard,
}

impl PreparedDraft {
    pub fn is_reserved(&self) -> bool {
        self.guard.is_exclusive()
    }
}

pub struct DraftPipeline<C: Composer> {
    ledger: Arc<dyn LedgerRpc>,
    config: PipelineConfig,
    composer: DraftComposer,
    coordinator: SignatureCoordinator,
    reservation: Arc<dyn UtxoReservation>,
    _operation: PhantomData<fn(&C)>,
}

impl<C: Composer> DraftPipeline<C> {
    /// Build a pipeline; fails on an invalid configuration
    pub fn new(ledger: Arc<dyn LedgerRpc>, config: PipelineConfig) -> DraftResult<Self> {
        config.validate()?;
        Ok(Self {
            composer: DraftComposer::new(ledger.clone(), config.fee, config.compose_limits()),
            coordinator: SignatureCoordinator::new(ledger.clone(), config.parallel_signing),
            reservation: Arc::new(UnreservedUtxos),
            ledger,
            config,
            _operation: PhantomData,
        })
    }

    pub fn with_reservation(mut self, reservation: Arc<dyn UtxoReservation>) -> Self {
        self.reservation = reservation;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn extractor(&self) -> ResultExtractor {
        ResultExtractor::new(self.ledger.clone())
    }

    /// Validate and compose a draft without signing it
    pub async fn compose(&self, operation: &C, ctx: &CallContext) -> DraftResult<TransactionDraft> {
        let ctx = self.config.apply_to(ctx);
        self.composer.compose(operation, &ctx).await
    }

    async fn reserve(&self, operation: &C, ctx: &CallContext) -> DraftResult<ReservationGuard> {
        // Validation first, so bad input never waits on a reservation
        self.composer.validate(operation)?;
        let payer = operation.funding().payer;
        let guard = self.reservation.reserve(&payer).await;
        ctx.check("reserve_utxos")?;
        Ok(guard)
    }

    /// Run the whole flow with one signer
    pub async fn execute(
        &self,
        operation: &C,
        signer: Arc<dyn HashSigner>,
        ctx: &CallContext,
    ) -> DraftResult<PipelineOutcome> {
        let ctx = self.config.apply_to(ctx);
        let _guard = self.reserve(operation, &ctx).await?;

        let draft = self.composer.compose(operation, &ctx).await?;
        let fee = draft.metadata().fee;
        let mut session = SigningSession::new(draft, self.config.sighash_type)?;
        self.coordinator
            .hash_and_sign(&mut session, signer, &ctx)
            .await?;
        self.coordinator.finalize(&mut session, &ctx).await?;
        let tx_hash = self.coordinator.submit(&mut session, &ctx).await?;

        info!(
            draft_id = session.draft().draft_id(),
            kind = %operation.kind(),
            fee,
            tx_hash = %tx_hash,
            "Draft pipeline completed"
        );
        Ok(PipelineOutcome {
            tx_hash,
            fee,
            draft: session.draft().clone(),
        })
    }

    /// Run the flow and extract the business result from the confirmed transaction
    pub async fn execute_and_extract(
        &self,
        operation: &C,
        signer: Arc<dyn HashSigner>,
        expectation: &Expectation,
        ctx: &CallContext,
    ) -> DraftResult<(PipelineOutcome, BusinessResult)> {
        let outcome = self.execute(operation, signer, ctx).await?;
        let ctx = self.config.apply_to(ctx);
        let result = self
            .extractor()
            .extract(&outcome.tx_hash, expectation, &ctx)
            .await?;
        Ok((outcome, result))
    }

    /// Compose and hash, then hand back a package for an offline signer
    pub async fn prepare(&self, operation: &C, ctx: &CallContext) -> DraftResult<PreparedDraft> {
        let ctx = self.config.apply_to(ctx);
        let guard = self.reserve(operation, &ctx).await?;
        let draft = self.composer.compose(operation, &ctx).await?;
        let mut session = SigningSession::new(draft, self.config.sighash_type)?;
        self.coordinator.request_hashes(&mut session, &ctx).await?;
        let package = session.export_package()?;
        debug!(
            draft_id = session.draft().draft_id(),
            requests = package.requests.len(),
            "Exported signing package"
        );
        Ok(PreparedDraft {
            session,
            package,
            guard,
        })
    }

    /// Attach offline signatures, then finalize and submit
    pub async fn complete(
        &self,
        prepared: PreparedDraft,
        signed: SignedPackage,
        ctx: &CallContext,
    ) -> DraftResult<PipelineOutcome> {
        let ctx = self.config.apply_to(ctx);
        let PreparedDraft {
            mut session,
            guard,
            ..
        } = prepared;
        if let Err(err) = session.attach_signed_package(signed) {
            warn!(
                draft_id = session.draft().draft_id(),
                error = %err,
                "Rejected signed package"
            );
            return Err(err);
        }
        self.coordinator.finalize(&mut session, &ctx).await?;
        let tx_hash = self.coordinator.submit(&mut session, &ctx).await?;
        drop(guard);

        let fee = session.draft().metadata().fee;
        info!(
            draft_id = session.draft().draft_id(),
            fee,
            tx_hash = %tx_hash,
            "Offline-signed draft submitted"
        );
        Ok(PipelineOutcome {
            tx_hash,
            fee,
            draft: session.draft().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::Address,
        errors::DraftError,
        ledger::MockLedger,
        signing::{
            models::types::VersionedDocument, prepare::operations::Transfer,
            signer::RistrettoHashSigner,
        },
    };

    fn setup(balance: u64) -> (MockLedger, Arc<RistrettoHashSigner>) {
        let ledger = MockLedger::new();
        let signer = Arc::new(RistrettoHashSigner::random());
        ledger.add_utxo(signer.address(), balance, None);
        (ledger, signer)
    }

    #[tokio::test]
    async fn test_execute_submits_transfer() {
        let (ledger, signer) = setup(1_000_000);
        let pipeline: DraftPipeline<Transfer> =
            DraftPipeline::new(Arc::new(ledger.clone()), PipelineConfig::default()).unwrap();
        let bob = Address::new([9; 20]);

        let outcome = pipeline
            .execute(
                &Transfer::new(signer.address(), bob, 100_000),
                signer.clone(),
                &CallContext::background(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.fee, 30);
        assert_eq!(ledger.utxos_of(&bob).len(), 1);
        assert_eq!(ledger.call_counts().submit_transaction, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let (ledger, _) = setup(1);
        let config = PipelineConfig::default().with_batch_concurrency(0);
        let result: DraftResult<DraftPipeline<Transfer>> =
            DraftPipeline::new(Arc::new(ledger), config);
        assert!(matches!(result, Err(DraftError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_prepare_then_complete_offline() {
        let (ledger, signer) = setup(50_000);
        let pipeline: DraftPipeline<Transfer> =
            DraftPipeline::new(Arc::new(ledger.clone()), PipelineConfig::default()).unwrap();
        let transfer = Transfer::new(signer.address(), Address::new([7; 20]), 10_000);
        let ctx = CallContext::background();

        let prepared = pipeline.prepare(&transfer, &ctx).await.unwrap();
        let json = prepared.package.to_json().unwrap();
        let package = SigningPackage::from_json(&json).unwrap();
        let signed = package.sign_with(signer.as_ref()).unwrap();

        let outcome = pipeline.complete(prepared, signed, &ctx).await.unwrap();
        assert_eq!(outcome.fee, 3);
        assert_eq!(ledger.call_counts().submit_transaction, 1);
    }
}

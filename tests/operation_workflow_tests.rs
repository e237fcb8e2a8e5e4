//! Each business operation composed, submitted and read back through extraction

use std::sync::Arc;

use ledger_draft_libs::{
    extraction::Outcome,
    ledger::MockLedger,
    signing::{
        prepare::{
            input_selector::DEFAULT_FLAT_FEE, Delegate, DeployResource, Escrow, Propose, Transfer,
            Vest, Vote,
        },
        Composer,
    },
    Address, CallContext, DraftError, DraftPipeline, Expectation, FixedHash, HashSigner, LockKind,
    Outpoint, PipelineConfig, ProducedId, RistrettoHashSigner,
};

struct Harness {
    ledger: MockLedger,
    signer: Arc<RistrettoHashSigner>,
}

impl Harness {
    fn new(balance: u64) -> Self {
        let ledger = MockLedger::new();
        let signer = Arc::new(RistrettoHashSigner::random());
        ledger.add_utxo(signer.address(), balance, None);
        Self { ledger, signer }
    }

    fn me(&self) -> Address {
        self.signer.address()
    }

    fn pipeline<C: Composer>(&self) -> DraftPipeline<C> {
        DraftPipeline::new(Arc::new(self.ledger.clone()), PipelineConfig::default()).unwrap()
    }
}

#[tokio::test]
async fn test_delegation_is_identified_by_its_lock() {
    let h = Harness::new(1_000_000);
    let delegate = Delegate {
        delegator: h.me(),
        validator: Address::new([0x77; 20]),
        amount: 250_000,
        token_id: None,
    };
    let (outcome, result) = h
        .pipeline::<Delegate>()
        .execute_and_extract(
            &delegate,
            h.signer.clone(),
            &Expectation::delegation(h.me()),
            &CallContext::background(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.fee, 75);
    assert_eq!(
        result.produced_id(),
        Some(ProducedId::Outpoint(Outpoint::new(outcome.tx_hash, 0)))
    );
    assert_eq!(outcome.draft.outputs()[0].lock().kind(), LockKind::Delegation);
}

#[tokio::test]
async fn test_vesting_locks_to_the_beneficiary() {
    let h = Harness::new(1_000_000);
    let beneficiary = Address::new([0x66; 20]);
    let vest = Vest {
        grantor: h.me(),
        beneficiary,
        amount: 400_000,
        token_id: None,
        unlock_time: 1_900_000_000,
    };
    let (outcome, result) = h
        .pipeline::<Vest>()
        .execute_and_extract(
            &vest,
            h.signer.clone(),
            &Expectation::vesting(beneficiary),
            &CallContext::background(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.fee, 120);
    assert_eq!(
        result.produced_id(),
        Some(ProducedId::Outpoint(Outpoint::new(outcome.tx_hash, 0)))
    );
}

#[tokio::test]
async fn test_escrow_with_arbiter_uses_two_of_three() {
    let h = Harness::new(1_000_000);
    let escrow = Escrow {
        payer: h.me(),
        payee: Address::new([0x12; 20]),
        arbiter: Some(Address::new([0x13; 20])),
        amount: 10_000,
        token_id: None,
    };
    let (outcome, result) = h
        .pipeline::<Escrow>()
        .execute_and_extract(
            &escrow,
            h.signer.clone(),
            &Expectation::escrow(h.me()),
            &CallContext::background(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.draft.outputs()[0].lock().kind(), LockKind::Threshold);
    assert!(matches!(
        result.produced_id(),
        Some(ProducedId::Outpoint(o)) if o.output_index == 0
    ));
}

#[tokio::test]
async fn test_proposal_and_vote_produce_state_ids() {
    let h = Harness::new(1_000_000);
    let proposal_id = FixedHash::digest(b"proposal-1");
    let propose = Propose {
        proposer: h.me(),
        proposal_id,
        payload_hash: FixedHash::digest(b"raise the block size"),
        approvers: Vec::new(),
        threshold: 0,
    };
    let (proposed, result) = h
        .pipeline::<Propose>()
        .execute_and_extract(
            &propose,
            h.signer.clone(),
            &Expectation::proposal(h.me()),
            &CallContext::background(),
        )
        .await
        .unwrap();
    assert_eq!(proposed.fee, DEFAULT_FLAT_FEE);
    assert_eq!(result.produced_id(), Some(ProducedId::StateId(proposal_id)));

    let vote = Vote {
        voter: h.me(),
        proposal: Outpoint::new(proposed.tx_hash, 0),
        proposal_owner: h.me(),
        proposal_id,
        ballot_hash: FixedHash::digest(b"yes"),
    };
    let (voted, result) = h
        .pipeline::<Vote>()
        .execute_and_extract(
            &vote,
            h.signer.clone(),
            &Expectation::vote(h.me()),
            &CallContext::background(),
        )
        .await
        .unwrap();
    // The proposal is referenced after the consumed fee input, never spent
    assert_eq!(voted.draft.consumed_input_indices(), vec![0]);
    assert!(!voted.draft.inputs()[1].is_consumed());
    assert_eq!(result.produced_id(), Some(ProducedId::StateId(vote.vote_id())));
}

#[tokio::test]
async fn test_deployment_produces_a_resource_outpoint() {
    let h = Harness::new(1_000_000);
    let deploy = DeployResource {
        deployer: h.me(),
        content_hash: FixedHash::digest(b"wasm module"),
    };
    let (outcome, result) = h
        .pipeline::<DeployResource>()
        .execute_and_extract(
            &deploy,
            h.signer.clone(),
            &Expectation::deployment(h.me()),
            &CallContext::background(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.fee, DEFAULT_FLAT_FEE);
    assert_eq!(
        result.produced_id(),
        Some(ProducedId::Outpoint(Outpoint::new(outcome.tx_hash, 0)))
    );
}

#[tokio::test]
async fn test_settlement_reports_derived_bonus() {
    let h = Harness::new(1_000_000);
    let recipient = Address::new([0x21; 20]);
    let (_, result) = h
        .pipeline::<Transfer>()
        .execute_and_extract(
            &Transfer::new(h.me(), recipient, 10_500),
            h.signer.clone(),
            &Expectation::settlement(recipient, None, Some(10_000)),
            &CallContext::background(),
        )
        .await
        .unwrap();
    match result.outcome {
        Outcome::Settled(settlement) => {
            assert_eq!(settlement.total, 10_500);
            assert_eq!(settlement.derived_bonus, Some(500));
        }
        other => panic!("expected a settlement, got {other:?}"),
    }
}

#[tokio::test]
async fn test_settlement_without_outputs_for_owner() {
    let h = Harness::new(1_000_000);
    let err = h
        .pipeline::<Transfer>()
        .execute_and_extract(
            &Transfer::new(h.me(), Address::new([0x21; 20]), 10_500),
            h.signer.clone(),
            &Expectation::settlement(Address::new([0x99; 20]), None, None),
            &CallContext::background(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DraftError::NoMatchingOutput { .. }));
}

#[tokio::test]
async fn test_self_delegation_is_rejected_before_any_query() {
    let h = Harness::new(1_000_000);
    let delegate = Delegate {
        delegator: h.me(),
        validator: h.me(),
        amount: 1,
        token_id: None,
    };
    let err = h
        .pipeline::<Delegate>()
        .execute(&delegate, h.signer.clone(), &CallContext::background())
        .await
        .unwrap_err();
    assert!(matches!(err, DraftError::InvalidArgument { .. }));
    assert_eq!(h.ledger.call_counts().query_utxos, 0);
}

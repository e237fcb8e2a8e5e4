//! Conservation, freeze and signature completeness of composed drafts

use std::sync::Arc;

use ledger_draft_libs::{
    ledger::MockLedger,
    signing::{
        check_signature_completeness,
        prepare::{BatchItem, BatchTransfer, Escrow, Stake, Transfer, Vest},
        Composer, SignatureCoordinator,
    },
    Address, AssetOutput, CallContext, DraftError, DraftPipeline, HashSigner, LockingCondition,
    Output, PipelineConfig, RistrettoHashSigner, SighashType, SigningSession, TransactionDraft,
};

fn ledger_with(owner: Address, amounts: &[u64]) -> MockLedger {
    let ledger = MockLedger::new();
    for amount in amounts {
        ledger.add_utxo(owner, *amount, None);
    }
    ledger
}

async fn compose<C: Composer>(ledger: &MockLedger, operation: &C) -> TransactionDraft {
    let pipeline: DraftPipeline<C> =
        DraftPipeline::new(Arc::new(ledger.clone()), PipelineConfig::default()).unwrap();
    pipeline
        .compose(operation, &CallContext::background())
        .await
        .unwrap()
}

fn assert_conserved(draft: &TransactionDraft) {
    let consumed: u64 = draft
        .inputs()
        .iter()
        .filter(|i| i.is_consumed())
        .map(|i| i.amount)
        .sum();
    let outputs: u64 = draft
        .outputs()
        .iter()
        .filter_map(|o| o.asset_amount(draft.metadata().token_id.as_ref()))
        .sum();
    assert_eq!(outputs + draft.metadata().fee, consumed, "{}", draft.summary());
}

#[tokio::test]
async fn test_every_value_operation_conserves_value() {
    let me = Address::new([1; 20]);
    let other = Address::new([2; 20]);
    let ledger = ledger_with(me, &[123_457, 98_765, 1_000_003]);

    assert_conserved(&compose(&ledger, &Transfer::new(me, other, 200_001)).await);
    assert_conserved(
        &compose(
            &ledger,
            &BatchTransfer::new(
                me,
                vec![
                    BatchItem {
                        recipient: other,
                        amount: 33_333,
                        token_id: None,
                    },
                    BatchItem {
                        recipient: Address::new([3; 20]),
                        amount: 66_667,
                        token_id: None,
                    },
                ],
            ),
        )
        .await,
    );
    assert_conserved(
        &compose(
            &ledger,
            &Stake {
                staker: me,
                amount: 500_000,
                token_id: None,
                unlock_height: 10,
                contract: None,
            },
        )
        .await,
    );
    assert_conserved(
        &compose(
            &ledger,
            &Vest {
                grantor: me,
                beneficiary: other,
                amount: 7,
                token_id: None,
                unlock_time: 1,
            },
        )
        .await,
    );
    assert_conserved(
        &compose(
            &ledger,
            &Escrow {
                payer: me,
                payee: other,
                arbiter: None,
                amount: 1_100_000,
                token_id: None,
            },
        )
        .await,
    );
}

#[tokio::test]
async fn test_hashed_draft_is_frozen() {
    let signer = Arc::new(RistrettoHashSigner::random());
    let ledger = ledger_with(signer.address(), &[10_000]);
    let draft = compose(&ledger, &Transfer::new(signer.address(), Address::new([2; 20]), 100)).await;
    let coordinator = SignatureCoordinator::new(Arc::new(ledger.clone()), false);

    let mut session = SigningSession::new(draft, SighashType::All).unwrap();
    coordinator
        .request_hashes(&mut session, &CallContext::background())
        .await
        .unwrap();
    assert!(session.draft().is_frozen());

    // Mutating a copy of the hashed draft is refused
    let mut copy = session.draft().clone();
    let extra = Output::Asset(AssetOutput {
        owner: signer.address(),
        amount: 1,
        token_id: None,
        lock: LockingCondition::single_key(signer.address()),
    });
    assert_eq!(copy.push_output(extra.clone()), Err(DraftError::DraftFrozen));
    assert!(matches!(
        SigningSession::new(copy, SighashType::All),
        Err(DraftError::DraftFrozen)
    ));

    // A fork is a new draft: mutable, and needs its own hashes
    let mut fork = session.fork_draft();
    assert_ne!(fork.draft_id(), session.draft().draft_id());
    fork.push_output(extra).unwrap();
    let fork_session = SigningSession::new(fork, SighashType::All).unwrap();
    assert!(matches!(
        fork_session.hash_for(0),
        Err(DraftError::HashNotRequested { input_index: 0 })
    ));
}

#[tokio::test]
async fn test_completeness_rejects_foreign_and_duplicate_entries() {
    let signer = Arc::new(RistrettoHashSigner::random());
    let ledger = ledger_with(signer.address(), &[600, 600]);
    let draft = compose(&ledger, &Transfer::new(signer.address(), Address::new([2; 20]), 1000)).await;
    let coordinator = SignatureCoordinator::new(Arc::new(ledger.clone()), false);
    let ctx = CallContext::background();

    let mut session = SigningSession::new(draft, SighashType::All).unwrap();
    coordinator.request_hashes(&mut session, &ctx).await.unwrap();
    session.sign_with(signer.as_ref()).unwrap();
    let entries = session.signatures();
    let consumed = session.draft().consumed_input_indices();

    assert_eq!(check_signature_completeness(&consumed, &entries), Ok(()));

    let mut duplicated = entries.clone();
    duplicated.push(entries[0].clone());
    assert_eq!(
        check_signature_completeness(&consumed, &duplicated),
        Err(DraftError::DuplicateSignature { input_index: 0 })
    );

    let mut foreign = entries.clone();
    foreign[1].input_index = 7;
    assert_eq!(
        check_signature_completeness(&consumed, &foreign),
        Err(DraftError::UnexpectedSignature { input_index: 7 })
    );

    assert_eq!(
        check_signature_completeness(&consumed, &[]),
        Err(DraftError::MissingSignature { input_index: 0 })
    );
}

//! End-to-end pipeline scenarios against the in-memory ledger
//!
//! Each test funds addresses on a `MockLedger`, runs the draft pipeline and
//! checks what the ledger recorded.

use std::sync::Arc;

use ledger_draft_libs::{
    extraction::Outcome,
    ledger::MockLedger,
    signing::{
        prepare::{BatchItem, BatchTransfer, Stake, Transfer},
        SignatureCoordinator,
    },
    Address, CallContext, DraftError, DraftPipeline, Expectation, HashSigner, Outpoint,
    PipelineConfig, ProducedId, RistrettoHashSigner, SighashType, SigningSession, SigningState,
    TokenId,
};

fn funded_signer(ledger: &MockLedger, amounts: &[u64]) -> Arc<RistrettoHashSigner> {
    let signer = Arc::new(RistrettoHashSigner::random());
    for amount in amounts {
        ledger.add_utxo(signer.address(), *amount, None);
    }
    signer
}

fn pipeline<C: ledger_draft_libs::signing::Composer>(ledger: &MockLedger) -> DraftPipeline<C> {
    DraftPipeline::new(Arc::new(ledger.clone()), PipelineConfig::default()).unwrap()
}

/// One 1,000,000 UTXO, transfer of 1000: fee rounds to zero, change goes back to the sender
#[tokio::test]
async fn test_transfer_with_zero_fee_emits_payment_and_change() {
    let ledger = MockLedger::new();
    let signer = funded_signer(&ledger, &[1_000_000]);
    let recipient = Address::new([0x22; 20]);
    let transfer = Transfer::new(signer.address(), recipient, 1000);

    let draft = pipeline::<Transfer>(&ledger)
        .compose(&transfer, &CallContext::background())
        .await
        .unwrap();
    assert_eq!(draft.consumed_input_indices(), vec![0]);
    assert_eq!(draft.metadata().fee, 0);
    assert_eq!(draft.outputs().len(), 2);
    assert_eq!(draft.outputs()[0].owner(), &recipient);
    assert_eq!(draft.outputs()[0].asset_amount(None), Some(1000));
    assert_eq!(draft.outputs()[1].owner(), &signer.address());
    assert_eq!(draft.outputs()[1].asset_amount(None), Some(999_000));

    let outcome = pipeline::<Transfer>(&ledger)
        .execute(&transfer, signer.clone(), &CallContext::background())
        .await
        .unwrap();
    assert_eq!(outcome.fee, 0);
    let recipient_utxos = ledger.utxos_of(&recipient);
    assert_eq!(recipient_utxos.len(), 1);
    assert_eq!(recipient_utxos[0].amount, 1000);
    let sender_utxos = ledger.utxos_of(&signer.address());
    assert_eq!(sender_utxos.len(), 1);
    assert_eq!(sender_utxos[0].amount, 999_000);
}

#[tokio::test]
async fn test_transfer_beyond_balance_is_insufficient() {
    let ledger = MockLedger::new();
    let signer = funded_signer(&ledger, &[1_000_000]);
    let transfer = Transfer::new(signer.address(), Address::new([0x22; 20]), 500_000_000);

    let err = pipeline::<Transfer>(&ledger)
        .execute(&transfer, signer, &CallContext::background())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DraftError::InsufficientFunds {
            required: 500_000_000,
            fee: 150_000,
            available: 1_000_000,
        }
    );
    assert_eq!(ledger.call_counts().compute_signature_hash, 0);
}

#[tokio::test]
async fn test_mixed_token_batch_fails_before_any_query() {
    let ledger = MockLedger::new();
    let signer = funded_signer(&ledger, &[1_000_000]);
    let token_a = TokenId::new("tokenA").unwrap();
    let token_b = TokenId::new("tokenB").unwrap();
    let batch = BatchTransfer::new(
        signer.address(),
        vec![
            BatchItem {
                recipient: Address::new([2; 20]),
                amount: 100,
                token_id: Some(token_a.clone()),
            },
            BatchItem {
                recipient: Address::new([3; 20]),
                amount: 200,
                token_id: Some(token_b.clone()),
            },
        ],
    );

    let err = pipeline::<BatchTransfer>(&ledger)
        .execute(&batch, signer, &CallContext::background())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DraftError::InconsistentTokenId {
            expected: Some(token_a),
            found: Some(token_b),
        }
    );
    assert_eq!(ledger.call_counts().query_utxos, 0);
}

/// Two consumed inputs: finalize accepts the entries in any order and names
/// the lowest missing index otherwise
#[tokio::test]
async fn test_two_input_finalize_requires_every_signature() {
    let ledger = MockLedger::new();
    let signer = funded_signer(&ledger, &[600, 600]);
    let transfer = Transfer::new(signer.address(), Address::new([0x33; 20]), 1000);
    let ctx = CallContext::background();
    let draft = pipeline::<Transfer>(&ledger)
        .compose(&transfer, &ctx)
        .await
        .unwrap();
    assert_eq!(draft.consumed_input_indices(), vec![0, 1]);

    let coordinator = SignatureCoordinator::new(Arc::new(ledger.clone()), false);

    let mut complete = SigningSession::new(draft.clone(), SighashType::All).unwrap();
    coordinator.request_hashes(&mut complete, &ctx).await.unwrap();
    assert_eq!(complete.sign_with(signer.as_ref()).unwrap(), 2);
    let mut reversed = complete.signatures();
    reversed.reverse();
    coordinator
        .finalize_with(&mut complete, &reversed, &ctx)
        .await
        .unwrap();
    assert_eq!(complete.state(), SigningState::Finalized);

    let mut partial = SigningSession::new(draft, SighashType::All).unwrap();
    coordinator.request_hashes(&mut partial, &ctx).await.unwrap();
    partial.sign_with(signer.as_ref()).unwrap();
    let entries = partial.signatures();
    let err = coordinator
        .finalize_with(&mut partial, &entries[..1], &ctx)
        .await
        .unwrap_err();
    assert_eq!(err, DraftError::MissingSignature { input_index: 1 });
    assert_eq!(partial.state(), SigningState::Aborted);
    // Only the complete session reached the ledger's finalize
    assert_eq!(ledger.call_counts().finalize_transaction, 1);
}

#[tokio::test]
async fn test_stake_result_is_the_height_locked_outpoint() {
    let ledger = MockLedger::new();
    let signer = funded_signer(&ledger, &[1_000_000]);
    let stake = Stake {
        staker: signer.address(),
        amount: 100_000,
        token_id: None,
        unlock_height: 5_000,
        contract: None,
    };

    let (outcome, result) = pipeline::<Stake>(&ledger)
        .execute_and_extract(
            &stake,
            signer.clone(),
            &Expectation::stake(signer.address()),
            &CallContext::background(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.fee, 30);
    assert_eq!(
        result.produced_id(),
        Some(ProducedId::Outpoint(Outpoint::new(outcome.tx_hash, 0)))
    );
    match result.outcome {
        Outcome::Identified(identified) => {
            assert_eq!(identified.candidates, 1);
            assert!(!identified.ambiguous);
        }
        other => panic!("expected an identified output, got {other:?}"),
    }
    assert_eq!(result.block_height, ledger.tip_height());
}

#[tokio::test]
async fn test_batch_transfer_pays_every_recipient_from_one_draft() {
    let ledger = MockLedger::new();
    let signer = funded_signer(&ledger, &[40_000, 40_000]);
    let recipients: Vec<Address> = (10..13u8).map(|n| Address::new([n; 20])).collect();
    let items = recipients
        .iter()
        .map(|r| BatchItem {
            recipient: *r,
            amount: 20_000,
            token_id: None,
        })
        .collect();
    let batch = BatchTransfer::new(signer.address(), items);

    let outcome = pipeline::<BatchTransfer>(&ledger)
        .execute(&batch, signer.clone(), &CallContext::background())
        .await
        .unwrap();
    // 3/10000 of the 60,000 total, charged once
    assert_eq!(outcome.fee, 18);
    for recipient in &recipients {
        assert_eq!(ledger.utxos_of(recipient)[0].amount, 20_000);
    }
    assert_eq!(ledger.utxos_of(&signer.address())[0].amount, 80_000 - 60_000 - 18);
}

#[tokio::test]
async fn test_token_transfer_ignores_native_outputs() {
    let ledger = MockLedger::new();
    let signer = funded_signer(&ledger, &[5_000_000]);
    let token = TokenId::new("tokenA").unwrap();
    ledger.add_utxo(signer.address(), 70_000, Some(token.clone()));
    let recipient = Address::new([0x44; 20]);

    let outcome = pipeline::<Transfer>(&ledger)
        .execute(
            &Transfer::new(signer.address(), recipient, 50_000).with_token(token.clone()),
            signer.clone(),
            &CallContext::background(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.fee, 15);
    assert!(outcome
        .draft
        .inputs()
        .iter()
        .filter(|i| i.is_consumed())
        .all(|i| i.token_id.as_ref() == Some(&token)));
    let received = ledger.utxos_of(&recipient);
    assert_eq!(received[0].token_id, Some(token));
    // Native balance untouched
    assert!(ledger
        .utxos_of(&signer.address())
        .iter()
        .any(|u| u.token_id.is_none() && u.amount == 5_000_000));
}

//! Generic draft composition
//!
//! Every business operation is a [`Composer`] table entry; [`DraftComposer`]
//! runs the shared core: validate, select inputs, emit business outputs, add
//! change, and check conservation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    common::CallContext,
    data_structures::{
        AssetOutput, DraftMetadata, Input, LockingCondition, OperationKind, Output,
        TransactionDraft,
    },
    errors::{DraftError, DraftResult},
    ledger::LedgerRpc,
    signing::prepare::input_selector::{FeePolicy, FundingRequest, InputSelector, UtxoSelection},
};

pub const DEFAULT_MAX_BATCH_OUTPUTS: usize = 256;
pub const DEFAULT_MAX_MEMO_LEN: usize = 256;

/// Bounds checked during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeLimits {
    pub max_batch_outputs: usize,
    pub max_memo_len: usize,
}

impl Default for ComposeLimits {
    fn default() -> Self {
        Self {
            max_batch_outputs: DEFAULT_MAX_BATCH_OUTPUTS,
            max_memo_len: DEFAULT_MAX_MEMO_LEN,
        }
    }
}

/// One business operation's table entry
pub trait Composer: Send + Sync {
    fn kind(&self) -> OperationKind;

    /// Reject bad parameters. Runs before any ledger call.
    fn validate(&self, limits: &ComposeLimits) -> DraftResult<()>;

    /// Who pays, in which token, and how much
    fn funding(&self) -> FundingRequest;

    /// Business outputs, excluding change
    fn outputs(&self) -> DraftResult<Vec<Output>>;

    /// Read-only inputs placed after the consumed ones
    fn reference_inputs(&self) -> Vec<Input> {
        Vec::new()
    }

    fn memo(&self) -> Option<&str> {
        None
    }
}

pub struct DraftComposer {
    selector: InputSelector,
    limits: ComposeLimits,
}

impl DraftComposer {
    pub fn new(ledger: Arc<dyn LedgerRpc>, fee_policy: FeePolicy, limits: ComposeLimits) -> Self {
        Self {
            selector: InputSelector::new(ledger, fee_policy),
            limits,
        }
    }

    pub fn limits(&self) -> &ComposeLimits {
        &self.limits
    }

    /// Validate an operation without touching the ledger
    pub fn validate<C: Composer + ?Sized>(&self, operation: &C) -> DraftResult<()> {
        operation.validate(&self.limits)?;
        if let Some(memo) = operation.memo() {
            if memo.len() > self.limits.max_memo_len {
                return Err(DraftError::invalid_argument(
                    "memo",
                    format!("<{} bytes>", memo.len()),
                    format!("at most {} bytes", self.limits.max_memo_len),
                ));
            }
        }
        Ok(())
    }

    pub async fn compose<C: Composer + ?Sized>(
        &self,
        operation: &C,
        ctx: &CallContext,
    ) -> DraftResult<TransactionDraft> {
        self.validate(operation)?;
        let funding = operation.funding();
        let selection = self.selector.select(&funding, ctx).await?;
        self.assemble(operation, &funding, &selection)
    }

    /// Build the draft from an existing selection
    pub fn assemble<C: Composer + ?Sized>(
        &self,
        operation: &C,
        funding: &FundingRequest,
        selection: &UtxoSelection,
    ) -> DraftResult<TransactionDraft> {
        let mut metadata =
            DraftMetadata::new(operation.kind(), selection.fee, funding.token_id.clone());
        metadata.memo = operation.memo().map(str::to_string);
        let mut draft = TransactionDraft::new(metadata);

        for utxo in &selection.utxos {
            draft.push_input(Input::consume(utxo))?;
        }
        for reference in operation.reference_inputs() {
            draft.push_input(reference)?;
        }
        for output in operation.outputs()? {
            draft.push_output(output)?;
        }
        if let Some(change) = build_change_output(funding, selection) {
            draft.push_output(change)?;
        }

        draft.check_conservation()?;
        debug!(
            draft_id = draft.draft_id(),
            consumed = ?draft.consumed_input_indices(),
            "Consumed input indices"
        );
        info!(draft_id = draft.draft_id(), "Composed {}", draft.summary());
        Ok(draft)
    }
}

/// Change back to the payer, in the funding token, when anything is left over
fn build_change_output(funding: &FundingRequest, selection: &UtxoSelection) -> Option<Output> {
    if !selection.requires_change_output() {
        return None;
    }
    Some(Output::Asset(AssetOutput {
        owner: funding.payer,
        amount: selection.change,
        token_id: funding.token_id.clone(),
        lock: LockingCondition::single_key(funding.payer),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::{Address, FixedHash, Outpoint, SpendableOutput},
        ledger::MockLedger,
        signing::prepare::input_selector::SelectionStrategy,
    };

    struct Burn {
        payer: Address,
        amount: u64,
        memo: Option<String>,
    }

    impl Composer for Burn {
        fn kind(&self) -> OperationKind {
            OperationKind::Transfer
        }

        fn validate(&self, _limits: &ComposeLimits) -> DraftResult<()> {
            Ok(())
        }

        fn funding(&self) -> FundingRequest {
            FundingRequest::value(self.payer, None, self.amount)
        }

        fn outputs(&self) -> DraftResult<Vec<Output>> {
            Ok(vec![Output::Asset(AssetOutput {
                owner: Address::new([0; 20]),
                amount: self.amount,
                token_id: None,
                lock: LockingCondition::Contract {
                    contract_id: FixedHash::zero(),
                },
            })])
        }

        fn memo(&self) -> Option<&str> {
            self.memo.as_deref()
        }
    }

    fn composer() -> DraftComposer {
        DraftComposer::new(
            Arc::new(MockLedger::new()),
            FeePolicy::default(),
            ComposeLimits::default(),
        )
    }

    fn selection(payer: Address, amounts: &[u64], required: u64, fee: u64) -> UtxoSelection {
        let utxos: Vec<SpendableOutput> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| SpendableOutput {
                outpoint: Outpoint::new(FixedHash::new([i as u8; 32]), 0),
                owner: payer,
                amount: *amount,
                token_id: None,
                block_height: 0,
            })
            .collect();
        let total_value = amounts.iter().sum();
        UtxoSelection {
            utxos,
            total_value,
            required,
            fee,
            change: total_value - required - fee,
        }
    }

    #[test]
    fn test_assemble_appends_change_last() {
        let payer = Address::new([1; 20]);
        let op = Burn {
            payer,
            amount: 100,
            memo: None,
        };
        let draft = composer()
            .assemble(&op, &op.funding(), &selection(payer, &[80, 80], 100, 0))
            .unwrap();
        assert_eq!(draft.inputs().len(), 2);
        assert_eq!(draft.outputs().len(), 2);
        assert_eq!(draft.outputs()[1].owner(), &payer);
        assert_eq!(draft.outputs()[1].asset_amount(None), Some(60));
        assert!(draft.check_conservation().is_ok());
    }

    #[test]
    fn test_assemble_without_change() {
        let payer = Address::new([1; 20]);
        let op = Burn {
            payer,
            amount: 100,
            memo: None,
        };
        let draft = composer()
            .assemble(&op, &op.funding(), &selection(payer, &[100], 100, 0))
            .unwrap();
        assert_eq!(draft.outputs().len(), 1);
    }

    #[test]
    fn test_inconsistent_selection_violates_conservation() {
        let payer = Address::new([1; 20]);
        let op = Burn {
            payer,
            amount: 100,
            memo: None,
        };
        let mut bad = selection(payer, &[150], 100, 0);
        bad.change = 10;
        assert_eq!(
            composer().assemble(&op, &op.funding(), &bad),
            Err(DraftError::ConservationViolation {
                inputs: 150,
                outputs: 110,
                fee: 0,
            })
        );
    }

    #[test]
    fn test_memo_length_is_bounded() {
        let op = Burn {
            payer: Address::new([1; 20]),
            amount: 1,
            memo: Some("x".repeat(DEFAULT_MAX_MEMO_LEN + 1)),
        };
        assert!(matches!(
            composer().validate(&op),
            Err(DraftError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_flat_fee_funding_has_no_amount() {
        let request = FundingRequest::flat_fee(Address::new([1; 20]), SelectionStrategy::SingleUtxo);
        assert_eq!(request.required(), Ok(0));
    }
}

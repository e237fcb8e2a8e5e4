//! The unsigned, structural transaction draft
//!
//! A draft's identity is structural: the ledger hashes its serialized form. Once
//! a signature hash has been requested for it, the draft is frozen and every
//! mutator fails with [`DraftError::DraftFrozen`]. To change a frozen draft,
//! [`TransactionDraft::fork`] it; the fork is a new, unrelated draft for signing.

use std::fmt::{Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::{
    transaction_input::Input,
    transaction_output::Output,
    types::{token_label, TokenId},
};
use crate::errors::{DraftError, DraftResult};

/// Business operation a draft was composed for
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transfer,
    BatchTransfer,
    Stake,
    Delegate,
    Propose,
    Vote,
    DeployResource,
    Vest,
    Escrow,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Transfer => "transfer",
            OperationKind::BatchTransfer => "batch_transfer",
            OperationKind::Stake => "stake",
            OperationKind::Delegate => "delegate",
            OperationKind::Propose => "propose",
            OperationKind::Vote => "vote",
            OperationKind::DeployResource => "deploy_resource",
            OperationKind::Vest => "vest",
            OperationKind::Escrow => "escrow",
        };
        f.write_str(name)
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SignMode {
    /// Exactly one consumed input
    #[default]
    SingleInput,
    /// Several consumed inputs, each signed individually
    MultiInput,
}

/// Draft-level data that is committed to by every signature
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DraftMetadata {
    pub operation: OperationKind,
    /// Implicit fee: consumed value not carried by any output
    pub fee: u64,
    /// Token funding the draft; `None` for the native asset
    pub token_id: Option<TokenId>,
    pub memo: Option<String>,
}

impl DraftMetadata {
    pub fn new(operation: OperationKind, fee: u64, token_id: Option<TokenId>) -> Self {
        Self {
            operation,
            fee,
            token_id,
            memo: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TransactionDraft {
    sign_mode: SignMode,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    metadata: DraftMetadata,
    /// Local handle for logging; not part of the structural identity
    #[serde(skip)]
    #[borsh(skip)]
    draft_id: u64,
    #[serde(skip)]
    #[borsh(skip)]
    frozen: bool,
}

impl TransactionDraft {
    pub fn new(metadata: DraftMetadata) -> Self {
        Self {
            sign_mode: SignMode::SingleInput,
            inputs: Vec::new(),
            outputs: Vec::new(),
            metadata,
            draft_id: rand::random(),
            frozen: false,
        }
    }

    pub fn draft_id(&self) -> u64 {
        self.draft_id
    }

    pub fn sign_mode(&self) -> SignMode {
        self.sign_mode
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn metadata(&self) -> &DraftMetadata {
        &self.metadata
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self) -> DraftResult<()> {
        if self.frozen {
            return Err(DraftError::DraftFrozen);
        }
        Ok(())
    }

    /// Append an input; returns its `input_index`
    pub fn push_input(&mut self, input: Input) -> DraftResult<u32> {
        self.ensure_mutable()?;
        self.inputs.push(input);
        self.sign_mode = if self.inputs.iter().filter(|i| i.is_consumed()).count() > 1 {
            SignMode::MultiInput
        } else {
            SignMode::SingleInput
        };
        Ok((self.inputs.len() - 1) as u32)
    }

    /// Append an output; returns its index
    pub fn push_output(&mut self, output: Output) -> DraftResult<u32> {
        self.ensure_mutable()?;
        self.outputs.push(output);
        Ok((self.outputs.len() - 1) as u32)
    }

    pub fn set_memo(&mut self, memo: Option<String>) -> DraftResult<()> {
        self.ensure_mutable()?;
        self.metadata.memo = memo;
        Ok(())
    }

    /// Freeze the draft. Called when the first signature hash is requested.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// An unfrozen copy with a fresh draft id. Signatures collected for `self`
    /// do not apply to the fork.
    pub fn fork(&self) -> Self {
        Self {
            draft_id: rand::random(),
            frozen: false,
            ..self.clone()
        }
    }

    /// Ordered indices of every consumed input; each needs one signature
    pub fn consumed_input_indices(&self) -> Vec<u32> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| input.is_consumed())
            .map(|(index, _)| index as u32)
            .collect()
    }

    pub fn total_consumed(&self) -> DraftResult<u64> {
        checked_total(
            "inputs",
            self.inputs
                .iter()
                .filter(|i| i.is_consumed())
                .map(|i| i.amount),
        )
    }

    /// Sum of asset outputs carrying the draft's funding token
    pub fn total_asset_outputs(&self) -> DraftResult<u64> {
        checked_total(
            "outputs",
            self.outputs
                .iter()
                .filter_map(|o| o.asset_amount(self.metadata.token_id.as_ref())),
        )
    }

    /// `Σ asset outputs + fee == Σ consumed inputs`, with every consumed input
    /// carrying the draft's funding token
    pub fn check_conservation(&self) -> DraftResult<()> {
        let token = self.metadata.token_id.as_ref();
        if let Some(input) = self
            .inputs
            .iter()
            .find(|i| i.is_consumed() && i.token_id.as_ref() != token)
        {
            return Err(DraftError::InconsistentTokenId {
                expected: self.metadata.token_id.clone(),
                found: input.token_id.clone(),
            });
        }
        let inputs = self.total_consumed()?;
        let outputs = self.total_asset_outputs()?;
        let fee = self.metadata.fee;
        if outputs.checked_add(fee) != Some(inputs) {
            return Err(DraftError::ConservationViolation {
                inputs,
                outputs,
                fee,
            });
        }
        Ok(())
    }

    /// Short description for logs
    pub fn summary(&self) -> String {
        format!(
            "{} draft {:016x}: {} inputs ({} consumed), {} outputs, fee {} {}",
            self.metadata.operation,
            self.draft_id,
            self.inputs.len(),
            self.consumed_input_indices().len(),
            self.outputs.len(),
            self.metadata.fee,
            token_label(self.metadata.token_id.as_ref()),
        )
    }
}

fn checked_total(argument: &str, mut amounts: impl Iterator<Item = u64>) -> DraftResult<u64> {
    amounts
        .try_fold(0u64, |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| DraftError::invalid_argument(argument, "<sum>", "amounts overflow u64"))
}

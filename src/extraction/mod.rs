//! Business results recovered from confirmed transactions
//!
//! The ledger reports outputs, not business outcomes. Identifier results pick
//! the first output matching the expectation and say how many others matched.
//! Settlement bonuses are derived by subtraction. Both are best-effort values,
//! never ledger-authoritative fields.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    common::CallContext,
    data_structures::{
        token_label, Address, ConfirmedTransaction, FixedHash, LockKind, Outpoint, Output,
        OutputKind, TokenId,
    },
    errors::{DraftError, DraftResult},
    ledger::LedgerRpc,
};

/// Output shape an identifier-producing operation creates for its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierExpectation {
    pub kind: OutputKind,
    pub owner: Address,
    /// Accepted lock kinds; empty accepts any
    pub locks: Vec<LockKind>,
}

impl IdentifierExpectation {
    fn matches(&self, output: &Output) -> bool {
        output.kind() == self.kind
            && output.owner() == &self.owner
            && (self.locks.is_empty() || self.locks.contains(&output.lock().kind()))
    }
}

/// Value an amount-settling operation (unstake, claim, swap, remove-liquidity) pays out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementExpectation {
    pub owner: Address,
    pub token_id: Option<TokenId>,
    /// Principal the caller expects back; anything above is a derived bonus
    pub expected_amount: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Identifier(IdentifierExpectation),
    Settlement(SettlementExpectation),
}

impl Expectation {
    fn identifier(kind: OutputKind, owner: Address, locks: Vec<LockKind>) -> Self {
        Expectation::Identifier(IdentifierExpectation { kind, owner, locks })
    }

    pub fn stake(staker: Address) -> Self {
        Self::identifier(OutputKind::Asset, staker, vec![LockKind::Height])
    }

    pub fn delegation(delegator: Address) -> Self {
        Self::identifier(OutputKind::Asset, delegator, vec![LockKind::Delegation])
    }

    pub fn vesting(beneficiary: Address) -> Self {
        Self::identifier(OutputKind::Asset, beneficiary, vec![LockKind::Time])
    }

    pub fn escrow(payer: Address) -> Self {
        Self::identifier(
            OutputKind::Asset,
            payer,
            vec![LockKind::MultiKey, LockKind::Threshold],
        )
    }

    pub fn proposal(proposer: Address) -> Self {
        Self::identifier(
            OutputKind::State,
            proposer,
            vec![LockKind::Threshold, LockKind::SingleKey],
        )
    }

    pub fn vote(voter: Address) -> Self {
        Self::identifier(OutputKind::State, voter, vec![LockKind::SingleKey])
    }

    pub fn deployment(deployer: Address) -> Self {
        Self::identifier(OutputKind::Resource, deployer, Vec::new())
    }

    pub fn settlement(owner: Address, token_id: Option<TokenId>, expected_amount: Option<u64>) -> Self {
        Expectation::Settlement(SettlementExpectation {
            owner,
            token_id,
            expected_amount,
        })
    }

    fn owner(&self) -> &Address {
        match self {
            Expectation::Identifier(e) => &e.owner,
            Expectation::Settlement(e) => &e.owner,
        }
    }
}

/// Identifier of a produced output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ProducedId {
    Outpoint(Outpoint),
    StateId(FixedHash),
}

impl Display for ProducedId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducedId::Outpoint(outpoint) => write!(f, "{outpoint}"),
            ProducedId::StateId(state_id) => write!(f, "{state_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedOutput {
    pub id: ProducedId,
    pub output_index: u32,
    /// Outputs that matched the expectation
    pub candidates: usize,
    /// More than one output matched; `id` is the first in output order
    pub ambiguous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub token_id: Option<TokenId>,
    /// Sum of the caller's outputs in `token_id`
    pub total: u64,
    pub expected_amount: Option<u64>,
    /// `total - expected_amount`: a derived approximation, not a ledger field
    pub derived_bonus: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Identified(IdentifiedOutput),
    Settled(Settlement),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessResult {
    pub tx_hash: FixedHash,
    pub block_height: u64,
    pub outcome: Outcome,
}

impl BusinessResult {
    pub fn produced_id(&self) -> Option<ProducedId> {
        match &self.outcome {
            Outcome::Identified(identified) => Some(identified.id),
            Outcome::Settled(_) => None,
        }
    }
}

/// Parse every output; a single unparseable record fails the whole transaction
pub fn parse_outputs(transaction: &ConfirmedTransaction) -> DraftResult<Vec<Output>> {
    transaction
        .outputs
        .iter()
        .enumerate()
        .map(|(index, raw)| raw.parse(index))
        .collect()
}

/// Derive the business result of `transaction` for `expectation`
pub fn extract_from(
    transaction: &ConfirmedTransaction,
    expectation: &Expectation,
) -> DraftResult<BusinessResult> {
    let outputs = parse_outputs(transaction)?;
    let no_match = || DraftError::NoMatchingOutput {
        owner: expectation.owner().to_hex(),
    };

    let outcome = match expectation {
        Expectation::Identifier(expected) => {
            let matching: Vec<(usize, &Output)> = outputs
                .iter()
                .enumerate()
                .filter(|(_, output)| expected.matches(output))
                .collect();
            let (index, output) = *matching.first().ok_or_else(no_match)?;
            let id = match output {
                Output::State(state) => ProducedId::StateId(state.state_id),
                _ => ProducedId::Outpoint(Outpoint::new(transaction.tx_hash, index as u32)),
            };
            let ambiguous = matching.len() > 1;
            if ambiguous {
                warn!(
                    tx_hash = %transaction.tx_hash,
                    candidates = matching.len(),
                    "Several outputs match; using the first in output order"
                );
            }
            Outcome::Identified(IdentifiedOutput {
                id,
                output_index: index as u32,
                candidates: matching.len(),
                ambiguous,
            })
        }
        Expectation::Settlement(expected) => {
            let amounts: Vec<(usize, u64)> = outputs
                .iter()
                .enumerate()
                .filter(|(_, output)| output.owner() == &expected.owner)
                .filter_map(|(index, output)| {
                    output
                        .asset_amount(expected.token_id.as_ref())
                        .map(|amount| (index, amount))
                })
                .collect();
            if amounts.is_empty() {
                return Err(no_match());
            }
            let mut total = 0u64;
            for (index, amount) in amounts {
                total = total
                    .checked_add(amount)
                    .ok_or_else(|| DraftError::MalformedTransaction {
                        output_index: index,
                        reason: "settled amounts overflow u64".into(),
                    })?;
            }
            let derived_bonus = expected
                .expected_amount
                .map(|principal| total.saturating_sub(principal));
            debug!(
                tx_hash = %transaction.tx_hash,
                token = token_label(expected.token_id.as_ref()),
                total,
                ?derived_bonus,
                "Settled amount"
            );
            Outcome::Settled(Settlement {
                token_id: expected.token_id.clone(),
                total,
                expected_amount: expected.expected_amount,
                derived_bonus,
            })
        }
    };

    Ok(BusinessResult {
        tx_hash: transaction.tx_hash,
        block_height: transaction.block_height,
        outcome,
    })
}

pub struct ResultExtractor {
    ledger: Arc<dyn LedgerRpc>,
}

impl ResultExtractor {
    pub fn new(ledger: Arc<dyn LedgerRpc>) -> Self {
        Self { ledger }
    }

    /// Fetch a confirmed transaction and derive its business result
    pub async fn extract(
        &self,
        tx_hash: &FixedHash,
        expectation: &Expectation,
        ctx: &CallContext,
    ) -> DraftResult<BusinessResult> {
        let transaction = ctx
            .run("fetch_transaction", self.ledger.fetch_transaction(tx_hash))
            .await?
            .ok_or_else(|| DraftError::TransactionUnavailable {
                tx_hash: tx_hash.to_hex(),
            })?;
        extract_from(&transaction, expectation)
    }
}

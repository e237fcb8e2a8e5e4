use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    common::CallContext,
    data_structures::{token_label, Address, SpendableOutput, TokenId},
    errors::{DraftError, DraftResult},
    ledger::LedgerRpc,
};

pub const DEFAULT_FEE_RATE_PER_10000: u64 = 3;
pub const DEFAULT_FLAT_FEE: u64 = 1000;

/// How fees are charged. The sender always pays, through reduced change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeePolicy {
    /// Proportional rate for value-moving operations, in 1/10000 of the amount
    pub rate_per_10000: u64,
    /// Fee for operations that move no value
    pub flat_fee: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            rate_per_10000: DEFAULT_FEE_RATE_PER_10000,
            flat_fee: DEFAULT_FLAT_FEE,
        }
    }
}

impl FeePolicy {
    /// `floor(amount * rate / 10000)`, computed without overflow
    pub fn proportional_fee(&self, amount: u64) -> u64 {
        let fee = u128::from(amount) * u128::from(self.rate_per_10000) / 10_000;
        u64::try_from(fee).unwrap_or(u64::MAX)
    }

    pub fn fee_for(&self, basis: FeeBasis, amount: u64) -> u64 {
        match basis {
            FeeBasis::Proportional => self.proportional_fee(amount),
            FeeBasis::Flat => self.flat_fee,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeBasis {
    Proportional,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Walk outputs in ledger order until the target is covered
    FirstFit,
    /// Exactly one output that covers the target on its own
    SingleUtxo,
}

/// What a draft needs funded, and by whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRequest {
    pub payer: Address,
    pub token_id: Option<TokenId>,
    /// Business amounts; batches carry one per recipient
    pub amounts: Vec<u64>,
    pub fee_basis: FeeBasis,
    pub strategy: SelectionStrategy,
}

impl FundingRequest {
    /// Fund one value-moving amount
    pub fn value(payer: Address, token_id: Option<TokenId>, amount: u64) -> Self {
        Self::batch(payer, token_id, vec![amount])
    }

    /// Fund several amounts of one token; fee and change apply once to the total
    pub fn batch(payer: Address, token_id: Option<TokenId>, amounts: Vec<u64>) -> Self {
        Self {
            payer,
            token_id,
            amounts,
            fee_basis: FeeBasis::Proportional,
            strategy: SelectionStrategy::FirstFit,
        }
    }

    /// Fund only the flat fee of an operation that moves no value
    pub fn flat_fee(payer: Address, strategy: SelectionStrategy) -> Self {
        Self {
            payer,
            token_id: None,
            amounts: Vec::new(),
            fee_basis: FeeBasis::Flat,
            strategy,
        }
    }

    /// Aggregate business amount
    pub fn required(&self) -> DraftResult<u64> {
        self.amounts
            .iter()
            .try_fold(0u64, |acc, amount| acc.checked_add(*amount))
            .ok_or_else(|| {
                DraftError::invalid_argument("amounts", "<sum>", "total amount overflows u64")
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSelection {
    pub utxos: Vec<SpendableOutput>,
    pub total_value: u64,
    /// Business amount, excluding the fee
    pub required: u64,
    pub fee: u64,
    pub change: u64,
}

impl UtxoSelection {
    pub fn requires_change_output(&self) -> bool {
        self.change > 0
    }
}

pub struct InputSelector {
    pub ledger: Arc<dyn LedgerRpc>,
    pub fee_policy: FeePolicy,
}

impl InputSelector {
    pub fn new(ledger: Arc<dyn LedgerRpc>, fee_policy: FeePolicy) -> Self {
        Self { ledger, fee_policy }
    }

    /// Query the payer's outputs and select enough of them to cover the request
    pub async fn select(
        &self,
        request: &FundingRequest,
        ctx: &CallContext,
    ) -> DraftResult<UtxoSelection> {
        let required = request.required()?;
        let token = request.token_id.as_ref();
        let utxos = ctx
            .run("query_utxos", self.ledger.query_utxos(&request.payer, token))
            .await?;
        debug!(
            owner = %request.payer,
            token = token_label(token),
            candidates = utxos.len(),
            "Fetched spendable outputs"
        );
        self.select_from(request, required, utxos)
    }

    /// Pure selection over an already fetched output list
    pub fn select_from(
        &self,
        request: &FundingRequest,
        required: u64,
        candidates: Vec<SpendableOutput>,
    ) -> DraftResult<UtxoSelection> {
        let token = request.token_id.as_ref();
        let fee = self.fee_policy.fee_for(request.fee_basis, required);
        let target = required.checked_add(fee).ok_or_else(|| {
            DraftError::invalid_argument("amount", required, "amount plus fee overflows u64")
        })?;

        let eligible: Vec<SpendableOutput> = candidates
            .into_iter()
            .filter(|utxo| {
                let matches = utxo.owner == request.payer && utxo.matches_token(token);
                if !matches {
                    warn!(
                        outpoint = %utxo.outpoint,
                        expected_token = token_label(token),
                        found_token = token_label(utxo.token_id.as_ref()),
                        "Skipping output that does not belong to the funding request"
                    );
                }
                matches
            })
            .collect();
        let available = eligible
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.amount));
        let insufficient = || match available {
            Some(available) => DraftError::InsufficientFunds {
                required,
                fee,
                available,
            },
            None => funds_overflow(&request.payer),
        };

        let (utxos, total_value) = match request.strategy {
            SelectionStrategy::SingleUtxo => {
                let utxo = eligible
                    .into_iter()
                    .find(|u| u.amount >= target)
                    .ok_or_else(insufficient)?;
                let amount = utxo.amount;
                (vec![utxo], amount)
            }
            SelectionStrategy::FirstFit => {
                let mut utxos = Vec::new();
                let mut total_value = 0u64;
                for utxo in eligible {
                    if !utxos.is_empty() && total_value >= target {
                        break;
                    }
                    total_value = total_value
                        .checked_add(utxo.amount)
                        .ok_or_else(|| funds_overflow(&request.payer))?;
                    utxos.push(utxo);
                }
                if utxos.is_empty() || total_value < target {
                    return Err(insufficient());
                }
                (utxos, total_value)
            }
        };

        let selection = UtxoSelection {
            change: total_value - target,
            utxos,
            total_value,
            required,
            fee,
        };
        debug!(
            owner = %request.payer,
            selected = selection.utxos.len(),
            total = selection.total_value,
            fee = selection.fee,
            change = selection.change,
            "Selected inputs"
        );
        Ok(selection)
    }
}

fn funds_overflow(owner: &Address) -> DraftError {
    DraftError::invalid_argument("owner", owner, "selected output amounts overflow u64")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::{FixedHash, Outpoint},
        ledger::MockLedger,
    };

    fn payer() -> Address {
        Address::new([1; 20])
    }

    fn utxo(n: u8, amount: u64, token_id: Option<TokenId>) -> SpendableOutput {
        SpendableOutput {
            outpoint: Outpoint::new(FixedHash::new([n; 32]), 0),
            owner: payer(),
            amount,
            token_id,
            block_height: 1,
        }
    }

    fn selector() -> InputSelector {
        InputSelector::new(Arc::new(MockLedger::new()), FeePolicy::default())
    }

    #[test]
    fn test_proportional_fee_rounds_down() {
        let policy = FeePolicy::default();
        assert_eq!(policy.proportional_fee(1000), 0);
        assert_eq!(policy.proportional_fee(10_000), 3);
        assert_eq!(policy.proportional_fee(500_000_000), 150_000);
        assert_eq!(policy.proportional_fee(u64::MAX), 5_534_023_222_112_865);
    }

    #[test]
    fn test_first_fit_stops_once_covered() {
        let request = FundingRequest::value(payer(), None, 150);
        let candidates = vec![utxo(1, 100, None), utxo(2, 100, None), utxo(3, 100, None)];
        let selection = selector().select_from(&request, 150, candidates).unwrap();
        assert_eq!(selection.utxos.len(), 2);
        assert_eq!(selection.total_value, 200);
        assert_eq!(selection.fee, 0);
        assert_eq!(selection.change, 50);

        // Dropping the last selected output must break coverage
        let without_last: u64 = selection.utxos[..1].iter().map(|u| u.amount).sum();
        assert!(without_last < selection.required + selection.fee);
    }

    #[test]
    fn test_exact_cover_needs_no_change() {
        let request = FundingRequest::value(payer(), None, 100);
        let selection = selector()
            .select_from(&request, 100, vec![utxo(1, 100, None)])
            .unwrap();
        assert!(!selection.requires_change_output());
    }

    #[test]
    fn test_token_purity() {
        let token = TokenId::new("tokenA").unwrap();
        let request = FundingRequest::value(payer(), Some(token.clone()), 100);
        let candidates = vec![
            utxo(1, 1_000, None),
            utxo(2, 60, Some(token.clone())),
            utxo(3, 60, Some(TokenId::new("tokenB").unwrap())),
            utxo(4, 60, Some(token.clone())),
        ];
        let selection = selector().select_from(&request, 100, candidates).unwrap();
        assert!(selection
            .utxos
            .iter()
            .all(|u| u.token_id.as_ref() == Some(&token)));
        assert_eq!(selection.total_value, 120);
    }

    #[test]
    fn test_insufficient_funds_reports_available() {
        let request = FundingRequest::value(payer(), None, 500_000_000);
        let err = selector()
            .select_from(&request, 500_000_000, vec![utxo(1, 1_000_000, None)])
            .unwrap_err();
        assert_eq!(
            err,
            DraftError::InsufficientFunds {
                required: 500_000_000,
                fee: 150_000,
                available: 1_000_000,
            }
        );
    }

    #[test]
    fn test_selected_total_overflow_is_reported() {
        let half = 1u64 << 63;
        let request = FundingRequest::value(payer(), None, half);
        let err = selector()
            .select_from(&request, half, vec![utxo(1, half, None), utxo(2, half, None)])
            .unwrap_err();
        assert!(matches!(
            err,
            DraftError::InvalidArgument { ref argument, .. } if argument == "owner"
        ));
    }

    #[test]
    fn test_single_utxo_strategy_picks_first_covering_output() {
        let request = FundingRequest::flat_fee(payer(), SelectionStrategy::SingleUtxo);
        let candidates = vec![utxo(1, 500, None), utxo(2, 700, None), utxo(3, 5_000, None)];
        let selection = selector().select_from(&request, 0, candidates).unwrap();
        assert_eq!(selection.utxos.len(), 1);
        assert_eq!(selection.utxos[0].amount, 5_000);
        assert_eq!(selection.fee, DEFAULT_FLAT_FEE);
        assert_eq!(selection.change, 4_000);
    }

    #[test]
    fn test_batch_required_overflow_is_invalid() {
        let request = FundingRequest::batch(payer(), None, vec![u64::MAX, 1]);
        assert!(matches!(
            request.required(),
            Err(DraftError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_select_queries_ledger() {
        let ledger = MockLedger::new();
        ledger.add_utxo(payer(), 1_000_000, None);
        let selector = InputSelector::new(Arc::new(ledger.clone()), FeePolicy::default());
        let request = FundingRequest::value(payer(), None, 1000);
        let selection = selector
            .select(&request, &CallContext::background())
            .await
            .unwrap();
        assert_eq!(selection.change, 999_000);
        assert_eq!(ledger.call_counts().query_utxos, 1);
    }
}

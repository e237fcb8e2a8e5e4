//! Per-operation composition table
//!
//! | Operation | Consumes | Business outputs | Lock |
//! |---|---|---|---|
//! | [`Transfer`] | sender UTXOs | asset to recipient | SingleKey(recipient) |
//! | [`BatchTransfer`] | sender UTXOs, one token | asset per recipient | SingleKey per recipient |
//! | [`Stake`] | staker UTXOs | asset to staker | Height (+ contract) |
//! | [`Delegate`] | delegator UTXOs | asset to delegator | Delegation |
//! | [`Propose`] | one fee UTXO | proposal state | Threshold or SingleKey |
//! | [`Vote`] | one fee UTXO, references the proposal | vote state | SingleKey(voter) |
//! | [`DeployResource`] | deployer UTXOs | resource | SingleKey(deployer) |
//! | [`Vest`] | grantor UTXOs | asset to beneficiary | Time |
//! | [`Escrow`] | payer UTXOs | asset to payer | MultiKey or 2-of-3 Threshold |

use crate::{
    data_structures::{
        Address, AssetOutput, FixedHash, Input, LockingCondition, OperationKind, Outpoint,
        Output, ResourceOutput, StateOutput, TokenId,
    },
    errors::{DraftError, DraftResult},
    signing::prepare::{
        composer::{ComposeLimits, Composer},
        input_selector::{FundingRequest, SelectionStrategy},
    },
};

/// Version stamped on newly created state outputs
pub const INITIAL_STATE_VERSION: u64 = 1;

fn ensure_amount(argument: &str, amount: u64) -> DraftResult<()> {
    if amount == 0 {
        return Err(DraftError::invalid_argument(
            argument,
            amount,
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn asset(owner: Address, amount: u64, token_id: &Option<TokenId>, lock: LockingCondition) -> Output {
    Output::Asset(AssetOutput {
        owner,
        amount,
        token_id: token_id.clone(),
        lock,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub sender: Address,
    pub recipient: Address,
    pub amount: u64,
    pub token_id: Option<TokenId>,
    pub memo: Option<String>,
}

impl Transfer {
    pub fn new(sender: Address, recipient: Address, amount: u64) -> Self {
        Self {
            sender,
            recipient,
            amount,
            token_id: None,
            memo: None,
        }
    }

    pub fn with_token(mut self, token_id: TokenId) -> Self {
        self.token_id = Some(token_id);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

impl Composer for Transfer {
    fn kind(&self) -> OperationKind {
        OperationKind::Transfer
    }

    fn validate(&self, _limits: &ComposeLimits) -> DraftResult<()> {
        ensure_amount("amount", self.amount)
    }

    fn funding(&self) -> FundingRequest {
        FundingRequest::value(self.sender, self.token_id.clone(), self.amount)
    }

    fn outputs(&self) -> DraftResult<Vec<Output>> {
        Ok(vec![asset(
            self.recipient,
            self.amount,
            &self.token_id,
            LockingCondition::single_key(self.recipient),
        )])
    }

    fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub recipient: Address,
    pub amount: u64,
    pub token_id: Option<TokenId>,
}

/// Several transfers funded by one draft. All items must share one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTransfer {
    pub sender: Address,
    pub items: Vec<BatchItem>,
    pub memo: Option<String>,
}

impl BatchTransfer {
    pub fn new(sender: Address, items: Vec<BatchItem>) -> Self {
        Self {
            sender,
            items,
            memo: None,
        }
    }

    /// The shared token of every item
    pub fn token_id(&self) -> DraftResult<Option<TokenId>> {
        let Some(first) = self.items.first() else {
            return Err(DraftError::invalid_argument(
                "items",
                "[]",
                "a batch needs at least one item",
            ));
        };
        if let Some(other) = self.items.iter().find(|i| i.token_id != first.token_id) {
            return Err(DraftError::InconsistentTokenId {
                expected: first.token_id.clone(),
                found: other.token_id.clone(),
            });
        }
        Ok(first.token_id.clone())
    }
}

impl Composer for BatchTransfer {
    fn kind(&self) -> OperationKind {
        OperationKind::BatchTransfer
    }

    fn validate(&self, limits: &ComposeLimits) -> DraftResult<()> {
        self.token_id()?;
        if self.items.len() > limits.max_batch_outputs {
            return Err(DraftError::invalid_argument(
                "items",
                self.items.len(),
                format!("at most {} recipients per batch", limits.max_batch_outputs),
            ));
        }
        for (index, item) in self.items.iter().enumerate() {
            ensure_amount(&format!("items[{index}].amount"), item.amount)?;
        }
        Ok(())
    }

    fn funding(&self) -> FundingRequest {
        let token_id = self.items.first().and_then(|i| i.token_id.clone());
        FundingRequest::batch(
            self.sender,
            token_id,
            self.items.iter().map(|i| i.amount).collect(),
        )
    }

    fn outputs(&self) -> DraftResult<Vec<Output>> {
        Ok(self
            .items
            .iter()
            .map(|item| {
                asset(
                    item.recipient,
                    item.amount,
                    &item.token_id,
                    LockingCondition::single_key(item.recipient),
                )
            })
            .collect())
    }

    fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }
}

/// Lock value with the staker until a block height
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stake {
    pub staker: Address,
    pub amount: u64,
    pub token_id: Option<TokenId>,
    pub unlock_height: u64,
    /// Staking contract that may release the stake early
    pub contract: Option<FixedHash>,
}

impl Composer for Stake {
    fn kind(&self) -> OperationKind {
        OperationKind::Stake
    }

    fn validate(&self, _limits: &ComposeLimits) -> DraftResult<()> {
        ensure_amount("amount", self.amount)?;
        if self.unlock_height == 0 {
            return Err(DraftError::invalid_argument(
                "unlock_height",
                self.unlock_height,
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    fn funding(&self) -> FundingRequest {
        FundingRequest::value(self.staker, self.token_id.clone(), self.amount)
    }

    fn outputs(&self) -> DraftResult<Vec<Output>> {
        Ok(vec![asset(
            self.staker,
            self.amount,
            &self.token_id,
            LockingCondition::Height {
                owner: self.staker,
                unlock_height: self.unlock_height,
                contract: self.contract,
            },
        )])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegate {
    pub delegator: Address,
    pub validator: Address,
    pub amount: u64,
    pub token_id: Option<TokenId>,
}

impl Composer for Delegate {
    fn kind(&self) -> OperationKind {
        OperationKind::Delegate
    }

    fn validate(&self, _limits: &ComposeLimits) -> DraftResult<()> {
        ensure_amount("amount", self.amount)?;
        if self.delegator == self.validator {
            return Err(DraftError::invalid_argument(
                "validator",
                self.validator,
                "cannot delegate to self",
            ));
        }
        Ok(())
    }

    fn funding(&self) -> FundingRequest {
        FundingRequest::value(self.delegator, self.token_id.clone(), self.amount)
    }

    fn outputs(&self) -> DraftResult<Vec<Output>> {
        Ok(vec![asset(
            self.delegator,
            self.amount,
            &self.token_id,
            LockingCondition::Delegation {
                delegator: self.delegator,
                validator: self.validator,
            },
        )])
    }
}

/// Publish a proposal record. With approvers it is locked m-of-n, otherwise to the proposer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propose {
    pub proposer: Address,
    pub proposal_id: FixedHash,
    pub payload_hash: FixedHash,
    pub approvers: Vec<Address>,
    pub threshold: u32,
}

impl Propose {
    fn lock(&self) -> DraftResult<LockingCondition> {
        if self.approvers.is_empty() {
            return Ok(LockingCondition::single_key(self.proposer));
        }
        LockingCondition::threshold(self.approvers.clone(), self.threshold)
    }
}

impl Composer for Propose {
    fn kind(&self) -> OperationKind {
        OperationKind::Propose
    }

    fn validate(&self, _limits: &ComposeLimits) -> DraftResult<()> {
        self.lock().map(|_| ())
    }

    fn funding(&self) -> FundingRequest {
        FundingRequest::flat_fee(self.proposer, SelectionStrategy::SingleUtxo)
    }

    fn outputs(&self) -> DraftResult<Vec<Output>> {
        Ok(vec![Output::State(StateOutput {
            owner: self.proposer,
            state_id: self.proposal_id,
            state_version: INITIAL_STATE_VERSION,
            payload_hash: self.payload_hash,
            lock: self.lock()?,
        })])
    }
}

/// Cast a ballot on a proposal; the proposal output is referenced, not spent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub voter: Address,
    pub proposal: Outpoint,
    pub proposal_owner: Address,
    pub proposal_id: FixedHash,
    pub ballot_hash: FixedHash,
}

impl Vote {
    /// One vote record per (proposal, voter)
    pub fn vote_id(&self) -> FixedHash {
        let mut preimage = Vec::with_capacity(52);
        preimage.extend_from_slice(self.proposal_id.as_bytes());
        preimage.extend_from_slice(self.voter.as_bytes());
        FixedHash::digest(&preimage)
    }
}

impl Composer for Vote {
    fn kind(&self) -> OperationKind {
        OperationKind::Vote
    }

    fn validate(&self, _limits: &ComposeLimits) -> DraftResult<()> {
        if self.ballot_hash == FixedHash::zero() {
            return Err(DraftError::invalid_argument(
                "ballot_hash",
                self.ballot_hash,
                "ballot must not be empty",
            ));
        }
        Ok(())
    }

    fn funding(&self) -> FundingRequest {
        FundingRequest::flat_fee(self.voter, SelectionStrategy::SingleUtxo)
    }

    fn outputs(&self) -> DraftResult<Vec<Output>> {
        Ok(vec![Output::State(StateOutput {
            owner: self.voter,
            state_id: self.vote_id(),
            state_version: INITIAL_STATE_VERSION,
            payload_hash: self.ballot_hash,
            lock: LockingCondition::single_key(self.voter),
        })])
    }

    fn reference_inputs(&self) -> Vec<Input> {
        vec![Input::reference(self.proposal, self.proposal_owner)]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResource {
    pub deployer: Address,
    pub content_hash: FixedHash,
}

impl Composer for DeployResource {
    fn kind(&self) -> OperationKind {
        OperationKind::DeployResource
    }

    fn validate(&self, _limits: &ComposeLimits) -> DraftResult<()> {
        if self.content_hash == FixedHash::zero() {
            return Err(DraftError::invalid_argument(
                "content_hash",
                self.content_hash,
                "content hash must not be zero",
            ));
        }
        Ok(())
    }

    fn funding(&self) -> FundingRequest {
        FundingRequest::flat_fee(self.deployer, SelectionStrategy::FirstFit)
    }

    fn outputs(&self) -> DraftResult<Vec<Output>> {
        Ok(vec![Output::Resource(ResourceOutput {
            owner: self.deployer,
            content_hash: self.content_hash,
            lock: LockingCondition::single_key(self.deployer),
        })])
    }
}

/// Grant value that the beneficiary can spend from `unlock_time`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vest {
    pub grantor: Address,
    pub beneficiary: Address,
    pub amount: u64,
    pub token_id: Option<TokenId>,
    /// Ledger clock value, seconds since the Unix epoch
    pub unlock_time: u64,
}

impl Composer for Vest {
    fn kind(&self) -> OperationKind {
        OperationKind::Vest
    }

    fn validate(&self, _limits: &ComposeLimits) -> DraftResult<()> {
        ensure_amount("amount", self.amount)?;
        if self.unlock_time == 0 {
            return Err(DraftError::invalid_argument(
                "unlock_time",
                self.unlock_time,
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    fn funding(&self) -> FundingRequest {
        FundingRequest::value(self.grantor, self.token_id.clone(), self.amount)
    }

    fn outputs(&self) -> DraftResult<Vec<Output>> {
        Ok(vec![asset(
            self.beneficiary,
            self.amount,
            &self.token_id,
            LockingCondition::Time {
                owner: self.beneficiary,
                unlock_time: self.unlock_time,
            },
        )])
    }
}

/// Park value under joint control of payer and payee, optionally with an arbiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escrow {
    pub payer: Address,
    pub payee: Address,
    pub arbiter: Option<Address>,
    pub amount: u64,
    pub token_id: Option<TokenId>,
}

impl Escrow {
    fn lock(&self) -> DraftResult<LockingCondition> {
        match self.arbiter {
            None => LockingCondition::multi_key(vec![self.payer, self.payee]),
            Some(arbiter) => {
                LockingCondition::threshold(vec![self.payer, self.payee, arbiter], 2)
            }
        }
    }
}

impl Composer for Escrow {
    fn kind(&self) -> OperationKind {
        OperationKind::Escrow
    }

    fn validate(&self, _limits: &ComposeLimits) -> DraftResult<()> {
        ensure_amount("amount", self.amount)?;
        self.lock().map(|_| ())
    }

    fn funding(&self) -> FundingRequest {
        FundingRequest::value(self.payer, self.token_id.clone(), self.amount)
    }

    fn outputs(&self) -> DraftResult<Vec<Output>> {
        Ok(vec![asset(self.payer, self.amount, &self.token_id, self.lock()?)])
    }
}

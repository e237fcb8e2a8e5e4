//! Locking conditions guarding outputs
//!
//! Exactly seven variants exist. Draft composition selects and parametrizes one
//! of them per business operation; it never invents new ones.

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::types::{Address, FixedHash};
use crate::errors::{DraftError, DraftResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LockingCondition {
    /// Spendable by one key
    SingleKey { address: Address },
    /// Every listed key must sign
    MultiKey { addresses: Vec<Address> },
    /// Released by a contract
    Contract { contract_id: FixedHash },
    /// Owned by the delegator, voting power assigned to the validator
    Delegation {
        delegator: Address,
        validator: Address,
    },
    /// Any `threshold` of the listed keys
    Threshold {
        addresses: Vec<Address>,
        threshold: u32,
    },
    /// Spendable by `owner` once the ledger clock reaches `unlock_time`
    Time { owner: Address, unlock_time: u64 },
    /// Spendable by `owner` from `unlock_height`, optionally released by a contract
    Height {
        owner: Address,
        unlock_height: u64,
        contract: Option<FixedHash>,
    },
}

/// Discriminant of [`LockingCondition`], used for matching during extraction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    SingleKey,
    MultiKey,
    Contract,
    Delegation,
    Threshold,
    Time,
    Height,
}

impl LockingCondition {
    pub fn single_key(address: Address) -> Self {
        LockingCondition::SingleKey { address }
    }

    /// Build a threshold lock, rejecting empty, duplicate or out-of-range parameters
    pub fn threshold(addresses: Vec<Address>, threshold: u32) -> DraftResult<Self> {
        ensure_distinct("addresses", &addresses)?;
        if threshold == 0 || threshold as usize > addresses.len() {
            return Err(DraftError::invalid_argument(
                "threshold",
                threshold,
                format!("must be between 1 and {}", addresses.len()),
            ));
        }
        Ok(LockingCondition::Threshold {
            addresses,
            threshold,
        })
    }

    /// Build a lock requiring every listed key
    pub fn multi_key(addresses: Vec<Address>) -> DraftResult<Self> {
        ensure_distinct("addresses", &addresses)?;
        Ok(LockingCondition::MultiKey { addresses })
    }

    pub fn kind(&self) -> LockKind {
        match self {
            LockingCondition::SingleKey { .. } => LockKind::SingleKey,
            LockingCondition::MultiKey { .. } => LockKind::MultiKey,
            LockingCondition::Contract { .. } => LockKind::Contract,
            LockingCondition::Delegation { .. } => LockKind::Delegation,
            LockingCondition::Threshold { .. } => LockKind::Threshold,
            LockingCondition::Time { .. } => LockKind::Time,
            LockingCondition::Height { .. } => LockKind::Height,
        }
    }
}

fn ensure_distinct(argument: &str, addresses: &[Address]) -> DraftResult<()> {
    if addresses.is_empty() {
        return Err(DraftError::invalid_argument(
            argument,
            "[]",
            "at least one address is required",
        ));
    }
    let mut seen = BTreeSet::new();
    for address in addresses {
        if !seen.insert(address) {
            return Err(DraftError::invalid_argument(
                argument,
                address,
                "duplicate address",
            ));
        }
    }
    Ok(())
}

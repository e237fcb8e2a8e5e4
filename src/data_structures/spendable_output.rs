//! Spendable outputs (UTXOs) as returned by the ledger

use std::fmt::{Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::types::{Address, FixedHash, TokenId};

/// Unique reference to one output of a prior transaction
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
pub struct Outpoint {
    pub tx_hash: FixedHash,
    pub output_index: u32,
}

impl Outpoint {
    pub fn new(tx_hash: FixedHash, output_index: u32) -> Self {
        Self {
            tx_hash,
            output_index,
        }
    }
}

impl Display for Outpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.output_index)
    }
}

/// An unspent output owned by `owner`, usable as a future input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SpendableOutput {
    pub outpoint: Outpoint,
    pub owner: Address,
    pub amount: u64,
    /// `None` for the native asset
    pub token_id: Option<TokenId>,
    pub block_height: u64,
}

impl SpendableOutput {
    /// Whether this output carries the requested token (`None` = native)
    pub fn matches_token(&self, token_id: Option<&TokenId>) -> bool {
        self.token_id.as_ref() == token_id
    }
}

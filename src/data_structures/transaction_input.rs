use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::{
    spendable_output::{Outpoint, SpendableOutput},
    types::{Address, TokenId},
};

/// How an input uses the output it references
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Spends the output, removing it from the spendable set. Requires a signature.
    Consume,
    /// Reads the output without spending it (read-only proofs). Never signed.
    Reference,
}

/// A draft input. Its position in the draft is its `input_index`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Input {
    pub outpoint: Outpoint,
    pub mode: InputMode,
    pub owner: Address,
    /// Value of the referenced output; zero for non-asset references
    pub amount: u64,
    pub token_id: Option<TokenId>,
}

impl Input {
    pub fn consume(utxo: &SpendableOutput) -> Self {
        Self {
            outpoint: utxo.outpoint,
            mode: InputMode::Consume,
            owner: utxo.owner,
            amount: utxo.amount,
            token_id: utxo.token_id.clone(),
        }
    }

    pub fn reference(outpoint: Outpoint, owner: Address) -> Self {
        Self {
            outpoint,
            mode: InputMode::Reference,
            owner,
            amount: 0,
            token_id: None,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.mode == InputMode::Consume
    }
}

//! Typed transaction outputs and their loosely-typed wire form

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::{
    locking_condition::LockingCondition,
    types::{Address, FixedHash, TokenId},
};
use crate::errors::{DraftError, DraftResult};

/// Output carrying value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AssetOutput {
    pub owner: Address,
    pub amount: u64,
    pub token_id: Option<TokenId>,
    pub lock: LockingCondition,
}

/// Output carrying an opaque state record (proposal, vote, ...)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StateOutput {
    pub owner: Address,
    pub state_id: FixedHash,
    pub state_version: u64,
    pub payload_hash: FixedHash,
    pub lock: LockingCondition,
}

/// Output referencing a deployable resource by content hash
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ResourceOutput {
    pub owner: Address,
    pub content_hash: FixedHash,
    pub lock: LockingCondition,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Output {
    Asset(AssetOutput),
    State(StateOutput),
    Resource(ResourceOutput),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Asset,
    State,
    Resource,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Asset => "asset",
            OutputKind::State => "state",
            OutputKind::Resource => "resource",
        }
    }
}

impl Output {
    pub fn kind(&self) -> OutputKind {
        match self {
            Output::Asset(_) => OutputKind::Asset,
            Output::State(_) => OutputKind::State,
            Output::Resource(_) => OutputKind::Resource,
        }
    }

    pub fn owner(&self) -> &Address {
        match self {
            Output::Asset(o) => &o.owner,
            Output::State(o) => &o.owner,
            Output::Resource(o) => &o.owner,
        }
    }

    pub fn lock(&self) -> &LockingCondition {
        match self {
            Output::Asset(o) => &o.lock,
            Output::State(o) => &o.lock,
            Output::Resource(o) => &o.lock,
        }
    }

    /// Value carried by an asset output of `token_id`; `None` for anything else
    pub fn asset_amount(&self, token_id: Option<&TokenId>) -> Option<u64> {
        match self {
            Output::Asset(o) if o.token_id.as_ref() == token_id => Some(o.amount),
            _ => None,
        }
    }
}

/// An output as delivered inside a confirmed transaction
///
/// Fields are optional strings so a ledger record can be received even when it
/// does not fit the typed model; [`RawOutput::parse`] decides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOutput {
    pub kind: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub state_id: Option<String>,
    #[serde(default)]
    pub state_version: Option<u64>,
    #[serde(default)]
    pub payload_hash: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub lock: Option<serde_json::Value>,
}

impl RawOutput {
    /// Parse into a typed [`Output`]; `output_index` is only used for error context
    pub fn parse(&self, output_index: usize) -> DraftResult<Output> {
        let malformed = |reason: String| DraftError::MalformedTransaction {
            output_index,
            reason,
        };

        let owner = self
            .owner
            .as_deref()
            .ok_or_else(|| malformed("missing owner".into()))
            .and_then(|o| Address::from_hex(o).map_err(|e| malformed(e.to_string())))?;
        let lock: LockingCondition = match &self.lock {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| malformed(format!("invalid lock: {e}")))?,
            None => return Err(malformed("missing lock".into())),
        };
        let hash_field = |name: &str, value: &Option<String>| -> DraftResult<FixedHash> {
            let value = value
                .as_deref()
                .ok_or_else(|| malformed(format!("missing {name}")))?;
            FixedHash::from_hex(value).map_err(|e| malformed(format!("{name}: {e}")))
        };

        match self.kind.as_str() {
            "asset" => {
                let amount = self
                    .amount
                    .ok_or_else(|| malformed("asset output without amount".into()))?;
                let token_id = match &self.token_id {
                    Some(t) => Some(TokenId::new(t.clone()).map_err(|e| malformed(e.to_string()))?),
                    None => None,
                };
                Ok(Output::Asset(AssetOutput {
                    owner,
                    amount,
                    token_id,
                    lock,
                }))
            }
            "state" => Ok(Output::State(StateOutput {
                owner,
                state_id: hash_field("state_id", &self.state_id)?,
                state_version: self
                    .state_version
                    .ok_or_else(|| malformed("missing state_version".into()))?,
                payload_hash: hash_field("payload_hash", &self.payload_hash)?,
                lock,
            })),
            "resource" => Ok(Output::Resource(ResourceOutput {
                owner,
                content_hash: hash_field("content_hash", &self.content_hash)?,
                lock,
            })),
            other => Err(malformed(format!("unknown output kind '{other}'"))),
        }
    }
}

impl From<&Output> for RawOutput {
    fn from(output: &Output) -> Self {
        let mut raw = RawOutput {
            kind: output.kind().as_str().to_string(),
            owner: Some(output.owner().to_hex()),
            lock: serde_json::to_value(output.lock()).ok(),
            ..Default::default()
        };
        match output {
            Output::Asset(o) => {
                raw.amount = Some(o.amount);
                raw.token_id = o.token_id.as_ref().map(|t| t.to_string());
            }
            Output::State(o) => {
                raw.state_id = Some(o.state_id.to_hex());
                raw.state_version = Some(o.state_version);
                raw.payload_hash = Some(o.payload_hash.to_hex());
            }
            Output::Resource(o) => {
                raw.content_hash = Some(o.content_hash.to_hex());
            }
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset() -> Output {
        let owner = Address::new([3; 20]);
        Output::Asset(AssetOutput {
            owner,
            amount: 42,
            token_id: Some(TokenId::new("tokenA").unwrap()),
            lock: LockingCondition::single_key(owner),
        })
    }

    #[test]
    fn test_raw_output_parses_back_to_typed_output() {
        let output = sample_asset();
        let raw = RawOutput::from(&output);
        assert_eq!(raw.kind, "asset");
        assert_eq!(raw.parse(0).unwrap(), output);
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let mut raw = RawOutput::from(&sample_asset());
        raw.kind = "mystery".into();
        assert!(matches!(
            raw.parse(4),
            Err(DraftError::MalformedTransaction { output_index: 4, .. })
        ));
    }

    #[test]
    fn test_state_output_requires_hashes() {
        let owner = Address::new([9; 20]);
        let raw = RawOutput {
            kind: "state".into(),
            owner: Some(owner.to_hex()),
            state_id: Some("00".repeat(32)),
            lock: serde_json::to_value(LockingCondition::single_key(owner)).ok(),
            ..Default::default()
        };
        let err = raw.parse(1).unwrap_err();
        assert!(err.to_string().contains("payload_hash"));
    }

    #[test]
    fn test_state_output_requires_version() {
        let owner = Address::new([9; 20]);
        let raw = RawOutput {
            kind: "state".into(),
            owner: Some(owner.to_hex()),
            state_id: Some("00".repeat(32)),
            payload_hash: Some("11".repeat(32)),
            lock: serde_json::to_value(LockingCondition::single_key(owner)).ok(),
            ..Default::default()
        };
        let err = raw.parse(4).unwrap_err();
        assert_eq!(
            err,
            DraftError::MalformedTransaction {
                output_index: 4,
                reason: "missing state_version".into()
            }
        );

        let versioned = RawOutput {
            state_version: Some(2),
            ..raw
        };
        assert!(matches!(
            versioned.parse(4),
            Ok(Output::State(StateOutput { state_version: 2, .. }))
        ));
    }

    #[test]
    fn test_asset_amount_filters_by_token() {
        let output = sample_asset();
        assert_eq!(output.asset_amount(None), None);
        assert_eq!(
            output.asset_amount(Some(&TokenId::new("tokenA").unwrap())),
            Some(42)
        );
    }
}

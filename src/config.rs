//! Pipeline configuration
//!
//! Loaded from JSON or built in code with `with_*` setters. Every field has a
//! default, so `{}` is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    common::CallContext,
    data_structures::SighashType,
    errors::{DraftError, DraftResult, SerializationError},
    signing::prepare::{
        composer::{ComposeLimits, DEFAULT_MAX_BATCH_OUTPUTS, DEFAULT_MAX_MEMO_LEN},
        input_selector::FeePolicy,
    },
};

pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fee: FeePolicy,
    pub sighash_type: SighashType,
    /// Run hash/sign pairs of multi-input drafts concurrently
    pub parallel_signing: bool,
    /// Deadline applied to each ledger call when the caller sets none
    pub call_timeout_secs: Option<u64>,
    /// Worker limit for batch balance queries
    pub batch_concurrency: usize,
    pub max_batch_outputs: usize,
    pub max_memo_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fee: FeePolicy::default(),
            sighash_type: SighashType::All,
            parallel_signing: false,
            call_timeout_secs: None,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            max_batch_outputs: DEFAULT_MAX_BATCH_OUTPUTS,
            max_memo_len: DEFAULT_MAX_MEMO_LEN,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> DraftResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SerializationError::JsonDeserializationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_fee_policy(mut self, fee: FeePolicy) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_sighash_type(mut self, sighash_type: SighashType) -> Self {
        self.sighash_type = sighash_type;
        self
    }

    pub fn with_parallel_signing(mut self, parallel: bool) -> Self {
        self.parallel_signing = parallel;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency;
        self
    }

    pub fn with_max_batch_outputs(mut self, max: usize) -> Self {
        self.max_batch_outputs = max;
        self
    }

    pub fn with_max_memo_len(mut self, max: usize) -> Self {
        self.max_memo_len = max;
        self
    }

    pub fn validate(&self) -> DraftResult<()> {
        if self.fee.rate_per_10000 > 10_000 {
            return Err(DraftError::invalid_argument(
                "fee.rate_per_10000",
                self.fee.rate_per_10000,
                "rate cannot exceed 100%",
            ));
        }
        if self.call_timeout_secs == Some(0) {
            return Err(DraftError::invalid_argument(
                "call_timeout_secs",
                0,
                "must be at least one second",
            ));
        }
        if self.batch_concurrency == 0 {
            return Err(DraftError::invalid_argument(
                "batch_concurrency",
                0,
                "must be at least 1",
            ));
        }
        if self.max_batch_outputs == 0 {
            return Err(DraftError::invalid_argument(
                "max_batch_outputs",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    pub fn compose_limits(&self) -> ComposeLimits {
        ComposeLimits {
            max_batch_outputs: self.max_batch_outputs,
            max_memo_len: self.max_memo_len,
        }
    }

    /// The caller's context, with the configured deadline when it has none
    pub fn apply_to(&self, ctx: &CallContext) -> CallContext {
        match (ctx.call_timeout(), self.call_timeout()) {
            (None, Some(timeout)) => ctx.clone().with_call_timeout(timeout),
            _ => ctx.clone(),
        }
    }
}

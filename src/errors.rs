//! Error types for draft composition, signing and result extraction
//!
//! Every failure carries enough structured context (which input, which amount,
//! required versus available) for a caller to decide whether to recompose with
//! fresh inputs or abort.

use thiserror::Error;

use crate::data_structures::TokenId;

/// Result alias used throughout the crate
pub type DraftResult<T> = Result<T, DraftError>;

/// Errors raised while serializing or deserializing drafts and packages
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonSerializationError(String),

    #[error("JSON deserialization failed: {0}")]
    JsonDeserializationError(String),

    #[error("Borsh serialization failed: {0}")]
    BorshSerializationError(String),

    #[error("Borsh deserialization failed: {0}")]
    BorshDeserializationError(String),

    #[error("Hex decoding failed: {0}")]
    HexDecodingError(String),
}

impl From<hex::FromHexError> for SerializationError {
    fn from(err: hex::FromHexError) -> Self {
        SerializationError::HexDecodingError(err.to_string())
    }
}

/// Failures of the remote ledger or the transport in front of it
///
/// These are opaque to the pipeline. The transport collaborator may retry them
/// under its own policy; the pipeline never retries a step itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger unreachable: {0}")]
    Unreachable(String),

    #[error("Ledger call '{step}' timed out")]
    Timeout { step: &'static str },

    #[error("Ledger returned an error (status {status}): {message}")]
    Remote { status: u16, message: String },
}

/// Main error type for the draft pipeline
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DraftError {
    // --- Input errors: caller mistakes, detected before any network call ---
    #[error("Invalid argument '{argument}' = '{value}': {message}")]
    InvalidArgument {
        argument: String,
        value: String,
        message: String,
    },

    #[error("Inconsistent token id in batch: expected {expected:?}, found {found:?}")]
    InconsistentTokenId {
        expected: Option<TokenId>,
        found: Option<TokenId>,
    },

    #[error("Draft is frozen: a signature hash has already been requested for it")]
    DraftFrozen,

    // --- Resource errors ---
    #[error("Insufficient funds: required {required} (+{fee} fee), available {available}")]
    InsufficientFunds {
        required: u64,
        fee: u64,
        available: u64,
    },

    // --- Protocol errors: drift between this client and the ledger ---
    #[error("Canonical unsigned transaction bytes differ for input {input_index}")]
    CanonicalizationMismatch { input_index: u32 },

    #[error("Missing signature for consumed input {input_index}")]
    MissingSignature { input_index: u32 },

    #[error("Duplicate signature for input {input_index}")]
    DuplicateSignature { input_index: u32 },

    #[error("Signature supplied for input {input_index}, which is not a consumed input")]
    UnexpectedSignature { input_index: u32 },

    #[error("No signature hash was requested for input {input_index}")]
    HashNotRequested { input_index: u32 },

    #[error("Signing session is in state {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Signing session was aborted; fork the draft and start a new session")]
    SessionAborted,

    #[error("Conservation violated: inputs {inputs} != outputs {outputs} + fee {fee}")]
    ConservationViolation { inputs: u64, outputs: u64, fee: u64 },

    // --- Transport / remote ---
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Operation cancelled during '{step}'")]
    Cancelled { step: &'static str },

    // --- Ledger rejection: terminal for the draft ---
    #[error("Transaction rejected by ledger: {reason}")]
    TransactionRejected { reason: String },

    // --- Result extraction ---
    #[error("Transaction {tx_hash} is unavailable")]
    TransactionUnavailable { tx_hash: String },

    #[error("Malformed transaction output {output_index}: {reason}")]
    MalformedTransaction { output_index: usize, reason: String },

    #[error("No output matching the expectation is owned by {owner}")]
    NoMatchingOutput { owner: String },

    // --- Support ---
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DraftError {
    /// Shorthand for building an [`DraftError::InvalidArgument`]
    pub fn invalid_argument(
        argument: impl Into<String>,
        value: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        DraftError::InvalidArgument {
            argument: argument.into(),
            value: value.to_string(),
            message: message.into(),
        }
    }

    /// Whether a transport collaborator may retry the failed call
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DraftError::Ledger(LedgerError::Unreachable(_))
                | DraftError::Ledger(LedgerError::Timeout { .. })
        )
    }

    /// Whether the error signals drift between this client and the ledger
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            DraftError::CanonicalizationMismatch { .. }
                | DraftError::MissingSignature { .. }
                | DraftError::DuplicateSignature { .. }
                | DraftError::UnexpectedSignature { .. }
                | DraftError::ConservationViolation { .. }
        )
    }
}

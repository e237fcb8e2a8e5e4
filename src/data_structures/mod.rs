//! Ledger-model data structures: UTXOs, inputs, typed outputs, locking
//! conditions, drafts and the signing exchange shapes.

pub mod draft;
pub mod locking_condition;
pub mod signature;
pub mod spendable_output;
pub mod transaction_input;
pub mod transaction_output;
pub mod types;

pub use draft::{DraftMetadata, OperationKind, SignMode, TransactionDraft};
pub use locking_condition::{LockKind, LockingCondition};
pub use signature::{
    CanonicalTxBytes, ConfirmedTransaction, FinalizedTransaction, SignatureEntry,
    SignatureHashResponse, SighashType, SubmitResponse,
};
pub use spendable_output::{Outpoint, SpendableOutput};
pub use transaction_input::{Input, InputMode};
pub use transaction_output::{
    AssetOutput, Output, OutputKind, RawOutput, ResourceOutput, StateOutput,
};
pub use types::{
    token_label, Address, FixedHash, PublicKeyBytes, SignatureBytes, TokenId, ADDRESS_LEN,
    HASH_LEN, PUBLIC_KEY_LEN, SIGNATURE_LEN,
};

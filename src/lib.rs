//! Transaction draft libraries for UTXO ledgers
//!
//! This crate turns business intents (transfers, staking, delegation,
//! governance, deployments, vesting, escrow) into unsigned transaction drafts,
//! drives the three-phase signing exchange with a remote ledger, and extracts
//! business results from confirmed transactions.
//!
//! The ledger itself is remote and authoritative. Everything here talks to it
//! through [`ledger::LedgerRpc`].
//!
//! ## Features
//!
//! - `http` (default): enables [`ledger::HttpLedgerClient`], a JSON over HTTP
//!   transport built on `reqwest`
//! - `cli`: builds the `draft-tool` binary
//!
//! ### Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ledger_draft_libs::{
//!     ledger::MockLedger, signing::prepare::Transfer, Address, CallContext, DraftPipeline,
//!     HashSigner, PipelineConfig, RistrettoHashSigner,
//! };
//!
//! # async fn run() -> ledger_draft_libs::DraftResult<()> {
//! let ledger = Arc::new(MockLedger::new());
//! let signer = Arc::new(RistrettoHashSigner::random());
//! let pipeline: DraftPipeline<Transfer> = DraftPipeline::new(ledger, PipelineConfig::default())?;
//!
//! let transfer = Transfer::new(signer.address(), Address::new([7; 20]), 10_000);
//! let outcome = pipeline
//!     .execute(&transfer, signer, &CallContext::background())
//!     .await?;
//! println!("submitted {}", outcome.tx_hash);
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod config;
pub mod data_structures;
pub mod errors;
pub mod extraction;
pub mod hex_utils;
pub mod ledger;
pub mod scanning;
pub mod signing;

pub use common::{
    AtomicCancellationToken, CallContext, CancellationHandle, CancellationToken, NeverCancelToken,
    TokioCancellationHandle, TokioCancellationToken,
};
pub use config::PipelineConfig;
pub use data_structures::*;
pub use errors::*;
pub use extraction::{
    BusinessResult, Expectation, Outcome, ProducedId, ResultExtractor, Settlement,
};
pub use ledger::{LedgerRpc, MockLedger};
pub use scanning::{AddressBalance, BatchBalanceQuery, BatchProgress, BatchProgressCallback};
pub use signing::{
    DraftPipeline, HashSigner, PerAddressLock, PipelineOutcome, RistrettoHashSigner,
    SigningSession, SigningState, UnreservedUtxos, UtxoReservation,
};

#[cfg(feature = "http")]
pub use ledger::HttpLedgerClient;

//! Read-only queries across many addresses

pub mod batch_query;
pub mod progress;

pub use batch_query::{AddressBalance, BatchBalanceQuery};
pub use progress::{BatchPhase, BatchProgress, BatchProgressCallback, LoggingProgress, NoProgress};

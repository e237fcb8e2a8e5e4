//! Turning business operations into unsigned drafts

pub mod composer;
pub mod input_selector;
pub mod operations;

pub use operations::{
    BatchItem, BatchTransfer, DeployResource, Delegate, Escrow, Propose, Stake, Transfer, Vest,
    Vote,
};

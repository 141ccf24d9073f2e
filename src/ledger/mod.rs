//! Ledger module containing account management, entry chains and transaction processing

pub mod account;
pub mod chain;
pub mod core;
pub mod transaction;

pub use account::*;
pub use chain::{AccountChain, ChainLink, InsertOutcome};
pub use core::*;
pub use transaction::*;

//! # Ledger Chain
//!
//! A double-entry ledger consistency engine. Every account keeps its journal
//! entries in one doubly linked chain ordered by posted date and a same-day
//! `order`; transactions group entries across accounts and must balance.
//!
//! ## Features
//!
//! - **Entry chains**: Insert, remove and repost entries while keeping dates
//!   monotonic and same-day orders unique
//! - **Transaction validation**: Balanced sums, unique accounts and at least
//!   two entries, with every violation reported at once
//! - **Money conversion**: Minor units to decimals through ISO-4217 exponents
//!   and per-entry exchange rates
//! - **Atomic commits**: Each operation is one change set guarded by
//!   per-account chain versions
//! - **Storage abstraction**: Database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use ledger_chain::{patterns, utils::MemoryStorage, AccountType, Ledger};
//! use chrono::NaiveDate;
//!
//! # tokio_test_block(async {
//! let mut ledger = Ledger::new(MemoryStorage::new());
//! ledger.create_account("cash", "Cash", "USD", AccountType::Asset).await?;
//! ledger.create_account("loan", "Loan", "USD", AccountType::Liability).await?;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! ledger
//!     .record_transaction(patterns::transfer("t1", "Drawdown", date, "loan", "cash", 10_000))
//!     .await?;
//! # Ok::<(), ledger_chain::LedgerError>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod config;
pub mod ledger;
pub mod money;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use ledger::*;
pub use money::Iso4217Converter;
pub use traits::*;
pub use types::*;

// Re-export transaction patterns for convenience
pub use ledger::transaction::patterns;

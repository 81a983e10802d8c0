//! # Bank Reconciliation
//!
//! A bank-statement reconciliation library: statement import with
//! deduplication, transaction-to-payable matching, and a reconciliation
//! state machine closing statement periods.
//!
//! ## Features
//!
//! - **Statement import**: chunked batches, per-row errors, idempotent re-import
//! - **Candidate matching**: weighted amount/date/reference scoring with confidence bands
//! - **Match registry**: at most one live match per transaction, optional paid notification
//! - **Reconciliation**: draft → completed → approved with adjustments and optimistic versioning
//! - **Storage abstraction**: Database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use bank_reconciliation::{ImportOptions, ImportRow, Ledger, OperationContext};
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! // This example shows basic usage - you need to implement LedgerStorage trait
//! // let storage = YourStorageImplementation::new();
//! // let mut ledger = Ledger::new(storage);
//! // let row = ImportRow::new(date, "Deposit".to_string(), BigDecimal::from(100));
//! // ledger.import_transactions("tenant", "account", vec![row], ImportOptions::default(), &ctx).await?;
//! ```

pub mod config;
pub mod ledger;
pub mod matching;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use ledger::*;
pub use matching::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;

//! Ledger module containing account balances and statement imports

pub mod account;
pub mod core;
pub mod transaction;

pub use account::*;
pub use self::core::*;
pub use transaction::*;

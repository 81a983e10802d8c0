//! Utility modules

pub mod memory_payables;
pub mod memory_storage;
#[cfg(test)]
pub(crate) mod test_support;
pub mod validation;

pub use memory_payables::*;
pub use memory_storage::*;
pub use validation::*;

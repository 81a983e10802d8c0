//! Statement reconciliation: period records and the engine closing them

pub mod engine;
pub mod period;

pub use engine::*;
pub use period::*;

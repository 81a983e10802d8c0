//! Transaction matching: candidate scoring and the match registry

pub mod matcher;
pub mod registry;
pub mod scoring;

pub use matcher::*;
pub use registry::*;
pub use scoring::*;

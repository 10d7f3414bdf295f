//! CLI command implementations.

pub mod connect;
pub mod permutation;
pub mod version;

//! CLI command implementations.

pub mod sessions;
pub mod simulate;

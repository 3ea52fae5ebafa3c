//! CLI command implementations.

pub mod common;
pub mod config;
pub mod status;
pub mod sync;

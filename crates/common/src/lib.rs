//! camrec Common Utilities
//!
//! Shared infrastructure for all camrec crates:
//! - Error types and result aliases
//! - Wall clock used to stamp recording segments
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;

//! medharvest-common: Shared types, errors, and network plumbing used across all medharvest crates.

pub mod error;
pub mod sandbox;
pub mod backoff;
pub mod harvest_config;

// Re-export commonly used types
pub use backoff::{RetryError, RetryPolicy};
pub use error::{HarvestError, Result};
pub use harvest_config::{HarvestConfig, SearchWindow};

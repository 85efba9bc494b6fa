//! # Warden Common
//!
//! Shared types, errors, and policy constants used across Warden components.
//!
//! ## Modules
//! - `types` - Core data structures (Candidate, AdmissionResult, BreakerState, etc.)
//! - `error` - Common error types
//! - `constants` - Default admission policy values

pub mod constants;
pub mod error;
pub mod types;

pub use error::WardenError;
pub use types::*;

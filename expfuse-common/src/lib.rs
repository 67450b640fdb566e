//! # Expfuse Common Library
//!
//! Shared code for the expediente fusion workspace:
//! - Error taxonomy (`Error` enum, `Result` alias)
//! - Fusion coefficients and matching-policy options
//! - TOML configuration loading with graceful defaults

pub mod config;
pub mod error;

pub use config::{FusionCoefficients, MatchingPolicyOptions};
pub use error::{Error, Result};

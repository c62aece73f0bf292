// src/lib.rs

//! In-memory configuration model of a continuous-delivery pipeline orchestrator.
//!
//! - [`models`]: the plain configuration entities.
//! - [`crate::core::graph`] and [`crate::core::merge`]: the configuration graph over one local
//!   source and any number of config-repository partials.
//! - [`crate::core::validator`]: the validation pass and its report.
//! - [`crate::core::cache`] and [`state`]: the published snapshot and its lookup cache.

pub mod constants;
pub mod core;
pub mod models;
pub mod state;

#[cfg(test)]
mod test_support;

pub use crate::core::errors::{ConfigError, ConfigErrors, ConfigResult};
pub use crate::core::graph::ConfigGraph;
pub use crate::core::validator::{ValidationReport, validate, validate_for_save};
pub use crate::state::ConfigState;

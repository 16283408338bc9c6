//! Shared building blocks for the COVID-19 time-series aggregator.
//!
//! Holds the domain models, per-source column schemas, the error type,
//! date helpers, CLI settings and number formatting used by the data,
//! runtime and binary crates.

pub mod error;
pub mod formatting;
pub mod models;
pub mod schema;
pub mod settings;
pub mod time_utils;

pub use error::{PipelineError, Result};

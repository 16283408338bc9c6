//! Refresh runtime for the aggregation pipeline.
//!
//! Caches pipeline results behind a TTL and rebuilds them on a fixed
//! interval, handing each fresh immutable table to consumers over a channel.

pub mod data_manager;
pub mod orchestrator;

pub use covid_core as core;
pub use covid_data as data;

//! Time-series aggregation pipeline.
//!
//! Reads wide per-metric CSV tables, melts them to long form, sums them per
//! region and date, outer-joins the metrics, derives daily deltas and exposes
//! the result as an immutable [`table::AggregatedTable`].

pub mod aggregator;
pub mod analysis;
pub mod reader;
pub mod remote;
pub mod reshape;
pub mod table;
pub mod writer;

pub use covid_core as core;

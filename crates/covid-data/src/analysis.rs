//! Pipeline entry points.
//!
//! Both entry points are pure functions of their inputs: every call loads
//! afresh and returns a new immutable [`PipelineOutput`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use covid_core::error::{PipelineError, Result};
use covid_core::models::{LongRecord, Metric, RegionCentroid, RegionKey};
use covid_core::settings::PipelineConfig;
use tracing::{debug, info};

use crate::aggregator::{region_centroids, TimeSeriesAggregator};
use crate::reader::{find_source_files, read_wide_table};
use crate::remote::{collect_remote_records, TimelineSource};
use crate::reshape::melt;
use crate::table::AggregatedTable;

/// Key column used for tables built from the remote API.
pub const REMOTE_KEY_COLUMN: &str = "Country/Region";

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata produced alongside the aggregated table.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PipelineMetadata {
    /// ISO-8601 timestamp when this result was generated.
    pub generated_at: String,
    /// Schema name, or `"remote"`.
    pub source_name: String,
    /// Source files (or remote regions) that contributed data.
    pub files_read: Vec<String>,
    /// Long records produced by the melt stage, all metrics together.
    pub records_melted: usize,
    /// Rows in the aggregated table.
    pub rows: usize,
    /// Distinct regions in the aggregated table.
    pub regions: usize,
    /// Date columns dropped under the lenient policy, as `file: column`.
    pub dropped_columns: Vec<String>,
    /// Remote regions whose fetch failed.
    pub failed_regions: Vec<String>,
    /// Wall-clock seconds spent reading sources.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent reshaping and aggregating.
    pub transform_time_seconds: f64,
}

/// The complete output of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: Arc<AggregatedTable>,
    /// Mean coordinates per region; empty when the source has none.
    pub centroids: Arc<BTreeMap<RegionKey, RegionCentroid>>,
    pub metadata: PipelineMetadata,
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Run the local pipeline for `config`.
///
/// 1. Discover the schema's source files under the data directory.
/// 2. Load each wide table that exists (the recovered table is optional).
/// 3. Melt, aggregate, join and diff.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineOutput> {
    let schema = &config.schema;

    // ── Step 1: Discover ──────────────────────────────────────────────────────
    let files = find_source_files(&config.data_dir, schema)?;
    if !files.contains_key(&Metric::Confirmed) {
        return Err(PipelineError::NoDataFiles(config.data_dir.clone()));
    }

    // ── Step 2: Load ──────────────────────────────────────────────────────────
    let load_start = Instant::now();
    let mut metadata = PipelineMetadata {
        source_name: schema.name.clone(),
        ..PipelineMetadata::default()
    };
    let mut tables = BTreeMap::new();
    for (metric, path) in &files {
        let (table, report) = read_wide_table(path, schema, *metric)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        metadata.dropped_columns.extend(
            report
                .dropped_columns
                .iter()
                .map(|col| format!("{file_name}: {col}")),
        );
        metadata.files_read.push(file_name);
        tables.insert(*metric, table);
    }
    metadata.load_time_seconds = load_start.elapsed().as_secs_f64();

    // ── Step 3: Transform ─────────────────────────────────────────────────────
    let transform_start = Instant::now();
    let centroids = tables
        .get(&Metric::Confirmed)
        .map(|t| region_centroids(t, schema))
        .unwrap_or_default();

    let melted = |metric: Metric| -> Vec<LongRecord> {
        tables.get(&metric).map(melt).unwrap_or_default()
    };
    let confirmed = melted(Metric::Confirmed);
    let deaths = melted(Metric::Deaths);
    let recovered = melted(Metric::Recovered);
    metadata.records_melted = confirmed.len() + deaths.len() + recovered.len();
    debug!(
        "Melted {} records from {} files",
        metadata.records_melted,
        metadata.files_read.len()
    );

    let table = TimeSeriesAggregator::for_schema(schema).aggregate(&confirmed, &deaths, &recovered)?;
    metadata.transform_time_seconds = transform_start.elapsed().as_secs_f64();

    Ok(finish(table, centroids, metadata))
}

/// Run the pipeline over remote per-region timelines.
///
/// Regions whose fetch fails are listed in
/// [`PipelineMetadata::failed_regions`] and otherwise ignored.
pub fn run_remote_pipeline(
    source: &dyn TimelineSource,
    regions: &[String],
) -> Result<PipelineOutput> {
    if regions.iter().all(|r| r.trim().is_empty()) {
        return Err(PipelineError::Config(
            "At least one --region is required with a remote source".to_string(),
        ));
    }

    let load_start = Instant::now();
    let batch = collect_remote_records(source, regions);
    let load_time_seconds = load_start.elapsed().as_secs_f64();

    let transform_start = Instant::now();
    let aggregator = TimeSeriesAggregator::for_keys(vec![REMOTE_KEY_COLUMN.to_string()]);
    let table = aggregator.aggregate(&batch.confirmed, &batch.deaths, &batch.recovered)?;

    let metadata = PipelineMetadata {
        source_name: "remote".to_string(),
        files_read: batch.fetched,
        records_melted: batch.confirmed.len() + batch.deaths.len() + batch.recovered.len(),
        failed_regions: batch.failed,
        load_time_seconds,
        transform_time_seconds: transform_start.elapsed().as_secs_f64(),
        ..PipelineMetadata::default()
    };

    Ok(finish(table, BTreeMap::new(), metadata))
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn finish(
    table: AggregatedTable,
    centroids: BTreeMap<RegionKey, RegionCentroid>,
    mut metadata: PipelineMetadata,
) -> PipelineOutput {
    metadata.generated_at = Utc::now().to_rfc3339();
    metadata.rows = table.len();
    metadata.regions = table.regions().len();
    info!(
        "Pipeline ({}) produced {} rows for {} regions in {:.2}s",
        metadata.source_name,
        metadata.rows,
        metadata.regions,
        metadata.load_time_seconds + metadata.transform_time_seconds
    );

    PipelineOutput {
        table: Arc::new(table),
        centroids: Arc::new(centroids),
        metadata,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

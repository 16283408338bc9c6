//! Per-metric aggregation, cross-metric join and daily deltas.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use covid_core::error::{PipelineError, Result};
use covid_core::models::{AggregatedRow, LongRecord, RegionCentroid, RegionKey, WideTable};
use covid_core::schema::SourceSchema;
use tracing::debug;

use crate::table::AggregatedTable;

/// Summed values of one metric keyed by (region, date), sorted by key.
pub type MetricSeries = BTreeMap<(RegionKey, NaiveDate), i64>;

// ── JoinedRow ─────────────────────────────────────────────────────────────────

/// One row of the outer join; a metric absent from its source is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRow {
    pub region: RegionKey,
    pub date: NaiveDate,
    pub confirmed: Option<i64>,
    pub deaths: Option<i64>,
    pub recovered: Option<i64>,
}

impl JoinedRow {
    /// Resolve missing metrics to zero: `(confirmed, deaths, recovered)`.
    pub fn fill_missing(&self) -> (i64, i64, i64) {
        (
            self.confirmed.unwrap_or(0),
            self.deaths.unwrap_or(0),
            self.recovered.unwrap_or(0),
        )
    }
}

// ── Stage functions ───────────────────────────────────────────────────────────

/// Sum `records` per (region, date); the region key is the projection of
/// each record's identifiers onto `key_indices`.
pub fn group_sum(records: &[LongRecord], key_indices: &[usize]) -> MetricSeries {
    let mut series = MetricSeries::new();
    for record in records {
        *series
            .entry((record.region_key(key_indices), record.date))
            .or_insert(0) += record.value;
    }
    series
}

/// Full outer join on (region, date).
///
/// Every key present in any input produces exactly one row; output is sorted
/// by (region, date).
pub fn outer_join(
    confirmed: &MetricSeries,
    deaths: &MetricSeries,
    recovered: &MetricSeries,
) -> Vec<JoinedRow> {
    let keys: BTreeSet<&(RegionKey, NaiveDate)> = confirmed
        .keys()
        .chain(deaths.keys())
        .chain(recovered.keys())
        .collect();

    keys.into_iter()
        .map(|key| JoinedRow {
            region: key.0.clone(),
            date: key.1,
            confirmed: confirmed.get(key).copied(),
            deaths: deaths.get(key).copied(),
            recovered: recovered.get(key).copied(),
        })
        .collect()
}

/// Append first differences per region.
///
/// Rows are sorted by (region, date) first. The first date of each region
/// gets a zero delta; negative deltas are kept as-is. Two rows with the same
/// region and date are rejected.
pub fn compute_deltas(mut rows: Vec<JoinedRow>) -> Result<Vec<AggregatedRow>> {
    rows.sort_by(|a, b| (&a.region, a.date).cmp(&(&b.region, b.date)));

    let mut out: Vec<AggregatedRow> = Vec::with_capacity(rows.len());
    for row in rows {
        let (confirmed, deaths, recovered) = row.fill_missing();

        let (new_confirmed, new_deaths, new_recovered) = match out.last() {
            Some(prev) if prev.region == row.region => {
                if prev.date == row.date {
                    return Err(PipelineError::DuplicateObservation {
                        region: row.region.label(),
                        date: row.date.to_string(),
                    });
                }
                (
                    confirmed - prev.confirmed,
                    deaths - prev.deaths,
                    recovered - prev.recovered,
                )
            }
            _ => (0, 0, 0),
        };

        out.push(AggregatedRow {
            region: row.region,
            date: row.date,
            confirmed,
            deaths,
            recovered,
            new_confirmed,
            new_deaths,
            new_recovered,
        });
    }
    Ok(out)
}

/// Mean coordinates per region from a wide table's identifier columns.
///
/// Rows with unparseable coordinates, or the `0,0` placeholder used for
/// unassigned counties, do not contribute.
pub fn region_centroids(
    table: &WideTable,
    schema: &SourceSchema,
) -> BTreeMap<RegionKey, RegionCentroid> {
    let Some((lat_idx, long_idx)) = schema.coordinate_indices() else {
        return BTreeMap::new();
    };
    let key_indices = schema.key_indices();

    let mut sums: BTreeMap<RegionKey, (f64, f64, u32)> = BTreeMap::new();
    for row in &table.rows {
        let lat = row.identifiers.get(lat_idx).and_then(|v| v.parse::<f64>().ok());
        let long = row.identifiers.get(long_idx).and_then(|v| v.parse::<f64>().ok());
        let (Some(lat), Some(long)) = (lat, long) else {
            continue;
        };
        if lat == 0.0 && long == 0.0 {
            continue;
        }
        let key = RegionKey(
            key_indices
                .iter()
                .map(|&i| row.identifiers.get(i).cloned().unwrap_or_default())
                .collect(),
        );
        let entry = sums.entry(key).or_insert((0.0, 0.0, 0));
        entry.0 += lat;
        entry.1 += long;
        entry.2 += 1;
    }

    sums.into_iter()
        .map(|(key, (lat, long, n))| {
            (
                key,
                RegionCentroid {
                    latitude: lat / f64::from(n),
                    longitude: long / f64::from(n),
                },
            )
        })
        .collect()
}

// ── TimeSeriesAggregator ──────────────────────────────────────────────────────

/// Runs the group → join → sort → diff stages for one region key layout.
#[derive(Debug, Clone)]
pub struct TimeSeriesAggregator {
    key_columns: Vec<String>,
    key_indices: Vec<usize>,
}

impl TimeSeriesAggregator {
    /// Aggregator keyed by `schema`'s key columns.
    pub fn for_schema(schema: &SourceSchema) -> Self {
        Self {
            key_columns: schema.key_columns.clone(),
            key_indices: schema.key_indices(),
        }
    }

    /// Aggregator for records whose identifiers already are the key parts.
    pub fn for_keys(key_columns: Vec<String>) -> Self {
        let key_indices = (0..key_columns.len()).collect();
        Self {
            key_columns,
            key_indices,
        }
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Aggregate the three metric record sets into an immutable table.
    ///
    /// Any of the inputs may be empty (a source without a recovered file,
    /// for instance); its column is then zero throughout.
    pub fn aggregate(
        &self,
        confirmed: &[LongRecord],
        deaths: &[LongRecord],
        recovered: &[LongRecord],
    ) -> Result<AggregatedTable> {
        let confirmed = group_sum(confirmed, &self.key_indices);
        let deaths = group_sum(deaths, &self.key_indices);
        let recovered = group_sum(recovered, &self.key_indices);
        debug!(
            "Grouped series: {} confirmed, {} deaths, {} recovered keys",
            confirmed.len(),
            deaths.len(),
            recovered.len()
        );

        let joined = outer_join(&confirmed, &deaths, &recovered);
        let rows = compute_deltas(joined)?;
        Ok(AggregatedTable::from_sorted_rows(self.key_columns.clone(), rows))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

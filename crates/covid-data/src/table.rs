//! The immutable aggregated table and its read-only query helpers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use covid_core::models::{
    AggregatedRow, MapPoint, Metric, RegionCentroid, RegionKey, SnapshotPolicy,
};

/// Aggregated rows sorted by (region, date), unique on that pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedTable {
    key_columns: Vec<String>,
    rows: Vec<AggregatedRow>,
}

impl AggregatedTable {
    /// Build a table, sorting `rows` by (region, date).
    pub fn new(key_columns: Vec<String>, mut rows: Vec<AggregatedRow>) -> Self {
        rows.sort_by(|a, b| (&a.region, a.date).cmp(&(&b.region, b.date)));
        Self { key_columns, rows }
    }

    /// Build a table from rows that are already in (region, date) order.
    pub(crate) fn from_sorted_rows(key_columns: Vec<String>, rows: Vec<AggregatedRow>) -> Self {
        debug_assert!(rows
            .windows(2)
            .all(|w| (&w[0].region, w[0].date) < (&w[1].region, w[1].date)));
        Self { key_columns, rows }
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn rows(&self) -> &[AggregatedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted unique region keys.
    pub fn regions(&self) -> Vec<RegionKey> {
        let mut out: Vec<RegionKey> = Vec::new();
        for row in &self.rows {
            if out.last() != Some(&row.region) {
                out.push(row.region.clone());
            }
        }
        out
    }

    /// Earliest and latest date in the table.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.rows.iter().map(|r| r.date).min()?;
        let max = self.rows.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).max()
    }

    /// Latest row per region according to `policy`.
    ///
    /// * [`SnapshotPolicy::GlobalMaxDate`]: rows dated on the table-wide
    ///   maximum; regions that stopped reporting earlier are absent.
    /// * [`SnapshotPolicy::LastPerRegion`]: each region's own last row.
    pub fn snapshot(&self, policy: SnapshotPolicy) -> Vec<&AggregatedRow> {
        match policy {
            SnapshotPolicy::GlobalMaxDate => match self.latest_date() {
                Some(max) => self.rows.iter().filter(|r| r.date == max).collect(),
                None => Vec::new(),
            },
            SnapshotPolicy::LastPerRegion => self
                .rows
                .iter()
                .enumerate()
                .filter(|(i, row)| {
                    self.rows
                        .get(i + 1)
                        .map_or(true, |next| next.region != row.region)
                })
                .map(|(_, row)| row)
                .collect(),
        }
    }

    /// Rows for `regions` within the inclusive `[start, end]` range.
    ///
    /// An empty region list selects every region; a missing bound is open.
    pub fn filter(
        &self,
        regions: &[RegionKey],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> AggregatedTable {
        let wanted: BTreeSet<&RegionKey> = regions.iter().collect();
        let rows = self
            .rows
            .iter()
            .filter(|r| wanted.is_empty() || wanted.contains(&r.region))
            .filter(|r| start.map_or(true, |s| r.date >= s))
            .filter(|r| end.map_or(true, |e| r.date <= e))
            .cloned()
            .collect();
        Self::from_sorted_rows(self.key_columns.clone(), rows)
    }

    /// One region's rows in date order.
    pub fn region_series(&self, region: &RegionKey) -> &[AggregatedRow] {
        let start = self.rows.partition_point(|r| &r.region < region);
        let len = self.rows[start..].partition_point(|r| &r.region == region);
        &self.rows[start..start + len]
    }

    /// The `n` snapshot rows with the largest cumulative `metric`.
    ///
    /// Ties are ordered by region key ascending.
    pub fn top_n(&self, n: usize, metric: Metric, policy: SnapshotPolicy) -> Vec<&AggregatedRow> {
        let mut rows = self.snapshot(policy);
        rows.sort_by(|a, b| {
            b.cumulative(metric)
                .cmp(&a.cumulative(metric))
                .then_with(|| a.region.cmp(&b.region))
        });
        rows.truncate(n);
        rows
    }

    /// Find the snapshot row whose region has a key part equal to `name`,
    /// ignoring case and surrounding whitespace.
    pub fn lookup(&self, name: &str, policy: SnapshotPolicy) -> Option<&AggregatedRow> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.snapshot(policy).into_iter().find(|row| {
            row.region
                .parts()
                .iter()
                .any(|part| part.trim().to_lowercase() == needle)
        })
    }

    /// [`AggregatedTable::lookup`] against each region's own latest row.
    pub fn lookup_latest(&self, name: &str) -> Option<&AggregatedRow> {
        self.lookup(name, SnapshotPolicy::LastPerRegion)
    }

    /// Snapshot rows joined with their region's coordinates.
    pub fn map_points(
        &self,
        centroids: &BTreeMap<RegionKey, RegionCentroid>,
        policy: SnapshotPolicy,
    ) -> Vec<MapPoint> {
        self.snapshot(policy)
            .into_iter()
            .filter_map(|row| {
                let centroid = centroids.get(&row.region)?;
                Some(MapPoint {
                    region: row.region.clone(),
                    date: row.date,
                    latitude: centroid.latitude,
                    longitude: centroid.longitude,
                    confirmed: row.confirmed,
                    deaths: row.deaths,
                })
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

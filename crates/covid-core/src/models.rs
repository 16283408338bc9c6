use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The three cumulative counters tracked for every region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Confirmed,
    Deaths,
    Recovered,
}

impl Metric {
    /// All metrics in output column order.
    pub const ALL: [Metric; 3] = [Metric::Confirmed, Metric::Deaths, Metric::Recovered];

    /// Column name used in CSV output (`"Confirmed"`, ...).
    pub fn column_name(self) -> &'static str {
        match self {
            Metric::Confirmed => "Confirmed",
            Metric::Deaths => "Deaths",
            Metric::Recovered => "Recovered",
        }
    }

    /// Lower-case token used in source file names (`time_series_covid19_{token}_global.csv`).
    pub fn file_token(self) -> &'static str {
        match self {
            Metric::Confirmed => "confirmed",
            Metric::Deaths => "deaths",
            Metric::Recovered => "recovered",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Ordered tuple of identifier values naming one aggregation unit.
///
/// Missing components are stored as empty strings so that ordering and
/// equality stay total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RegionKey(pub Vec<String>);

impl RegionKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// `true` when every component is empty.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|p| p.trim().is_empty())
    }

    /// Human-readable label: non-empty components joined by `", "`.
    pub fn label(&self) -> String {
        self.0
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One row of a wide source table: identifier values plus one cumulative
/// value per date column (`None` for an empty cell).
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    /// Identifier values in schema order, kept verbatim.
    pub identifiers: Arc<[String]>,
    pub values: Vec<Option<i64>>,
}

/// A wide table for a single metric: one row per entity, one column per day.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub source_name: String,
    pub metric: Metric,
    pub id_columns: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    /// Number of non-empty value cells.
    pub fn cell_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.values.iter().filter(|v| v.is_some()).count())
            .sum()
    }
}

/// One melted observation: a single (row, date) cell of a wide table.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    /// Identifier values of the originating wide row (shared across its cells).
    pub identifiers: Arc<[String]>,
    pub date: NaiveDate,
    pub metric: Metric,
    pub value: i64,
}

impl LongRecord {
    /// Project the identifiers onto the key columns given by `key_indices`.
    pub fn region_key(&self, key_indices: &[usize]) -> RegionKey {
        RegionKey(
            key_indices
                .iter()
                .map(|&i| self.identifiers.get(i).cloned().unwrap_or_default())
                .collect(),
        )
    }
}

/// Terminal output row: cumulative counts plus first differences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub region: RegionKey,
    pub date: NaiveDate,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub new_confirmed: i64,
    pub new_deaths: i64,
    pub new_recovered: i64,
}

impl AggregatedRow {
    /// Cumulative value for `metric`.
    pub fn cumulative(&self, metric: Metric) -> i64 {
        match metric {
            Metric::Confirmed => self.confirmed,
            Metric::Deaths => self.deaths,
            Metric::Recovered => self.recovered,
        }
    }

    /// Daily delta for `metric`.
    pub fn delta(&self, metric: Metric) -> i64 {
        match metric {
            Metric::Confirmed => self.new_confirmed,
            Metric::Deaths => self.new_deaths,
            Metric::Recovered => self.new_recovered,
        }
    }
}

/// Mean coordinates of every source row that rolled into a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionCentroid {
    pub latitude: f64,
    pub longitude: f64,
}

/// A snapshot row placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub region: RegionKey,
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub confirmed: i64,
    pub deaths: i64,
}

/// Which rows count as "latest" for map and heatmap views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotPolicy {
    /// Only rows dated at the table-wide maximum date; lagging regions are absent.
    #[default]
    GlobalMaxDate,
    /// Each region's own most recent row.
    LastPerRegion,
}

impl SnapshotPolicy {
    /// Parse the CLI spelling (`"global-max"` / `"last-per-region"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "global-max" => Some(SnapshotPolicy::GlobalMaxDate),
            "last-per-region" => Some(SnapshotPolicy::LastPerRegion),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SnapshotPolicy::GlobalMaxDate => "global-max",
            SnapshotPolicy::LastPerRegion => "last-per-region",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_key_label_skips_empty_parts() {
        let key = RegionKey::new(["", "Zeta"]);
        assert_eq!(key.label(), "Zeta");
        assert_eq!(key.to_string(), "Zeta");

        let county = RegionKey::new(["New York", "Kings", "36047"]);
        assert_eq!(county.label(), "New York, Kings, 36047");
    }

    #[test]
    fn test_region_key_blank() {
        assert!(RegionKey::new(["", " "]).is_blank());
        assert!(!RegionKey::new(["", "Italy"]).is_blank());
    }

    #[test]
    fn test_region_key_ordering_is_lexicographic() {
        let mut keys = vec![
            RegionKey::new(["", "US"]),
            RegionKey::new(["", "India"]),
            RegionKey::new(["Hubei", "China"]),
        ];
        keys.sort();
        let labels: Vec<String> = keys.iter().map(|k| k.label()).collect();
        assert_eq!(labels, vec!["India", "US", "Hubei, China"]);
    }

    #[test]
    fn test_long_record_region_key_projection() {
        let ids: Arc<[String]> = vec![
            "Hubei".to_string(),
            "China".to_string(),
            "30.97".to_string(),
            "112.27".to_string(),
        ]
        .into();
        let rec = LongRecord {
            identifiers: ids,
            date: NaiveDate::from_ymd_opt(2020, 1, 22).unwrap(),
            metric: Metric::Confirmed,
            value: 444,
        };
        assert_eq!(rec.region_key(&[1]), RegionKey::new(["China"]));
        assert_eq!(rec.region_key(&[0, 1]), RegionKey::new(["Hubei", "China"]));
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Metric::Deaths.column_name(), "Deaths");
        assert_eq!(Metric::Recovered.file_token(), "recovered");
        assert_eq!(Metric::ALL.len(), 3);
    }

    #[test]
    fn test_snapshot_policy_names_round_trip() {
        for policy in [SnapshotPolicy::GlobalMaxDate, SnapshotPolicy::LastPerRegion] {
            assert_eq!(SnapshotPolicy::from_name(policy.name()), Some(policy));
        }
        assert_eq!(SnapshotPolicy::from_name("latest"), None);
        assert_eq!(SnapshotPolicy::default(), SnapshotPolicy::GlobalMaxDate);
    }

    #[test]
    fn test_aggregated_row_accessors() {
        let row = AggregatedRow {
            region: RegionKey::new(["A"]),
            date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            confirmed: 10,
            deaths: 2,
            recovered: 1,
            new_confirmed: 5,
            new_deaths: 1,
            new_recovered: 0,
        };
        assert_eq!(row.cumulative(Metric::Deaths), 2);
        assert_eq!(row.delta(Metric::Confirmed), 5);
    }
}

//! Discovery and loading of wide `time_series_covid19_*.csv` tables.
//!
//! Column roles come from the [`SourceSchema`]: identifier columns are kept
//! verbatim, ignored columns are skipped and every other column must be a
//! `M/D/YY` date. Headers that fail to parse abort the load under
//! [`DatePolicy::Strict`] and are dropped under [`DatePolicy::Lenient`].

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use covid_core::error::{PipelineError, Result};
use covid_core::models::{Metric, RegionKey, WideRow, WideTable};
use covid_core::schema::{DatePolicy, SourceSchema};
use covid_core::time_utils::parse_source_date;
use tracing::{debug, warn};

/// Counters describing what a single load kept and discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_read: usize,
    /// Rows whose key columns were all empty.
    pub rows_dropped_blank: usize,
    /// Headers that were neither identifiers, ignored, nor valid dates.
    pub dropped_columns: Vec<String>,
    /// Value cells that could not be parsed as counts.
    pub dropped_cells: usize,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Locate the source file of every metric for `schema` under `data_dir`.
///
/// The directory is searched recursively; when a file name occurs more than
/// once the lexicographically first path wins. Metrics without a file are
/// simply absent from the map.
pub fn find_source_files(
    data_dir: &Path,
    schema: &SourceSchema,
) -> Result<BTreeMap<Metric, PathBuf>> {
    if !data_dir.exists() {
        return Err(PipelineError::DataPathNotFound(data_dir.to_path_buf()));
    }

    let mut candidates: Vec<PathBuf> = walkdir::WalkDir::new(data_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    candidates.sort();

    let mut found = BTreeMap::new();
    for metric in Metric::ALL {
        let wanted = schema.file_name(metric);
        let hit = candidates.iter().find(|p| {
            p.file_name()
                .map(|name| name.to_string_lossy() == wanted.as_str())
                .unwrap_or(false)
        });
        match hit {
            Some(path) => {
                debug!("{} source for {}: {}", metric, schema.name, path.display());
                found.insert(metric, path.clone());
            }
            None => debug!("No {} file for {} in {}", wanted, schema.name, data_dir.display()),
        }
    }

    Ok(found)
}

/// Read one wide table from disk.
pub fn read_wide_table(
    path: &Path,
    schema: &SourceSchema,
    metric: Metric,
) -> Result<(WideTable, LoadReport)> {
    let file = std::fs::File::open(path).map_err(|source| PipelineError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let (table, report) = parse_wide_table(file, schema, metric)?;

    debug!(
        "File {}: {} rows read, {} blank rows dropped, {} dates, {} columns dropped",
        path.display(),
        report.rows_read,
        report.rows_dropped_blank,
        table.dates.len(),
        report.dropped_columns.len(),
    );

    Ok((table, report))
}

/// Parse a wide table from any CSV byte stream.
pub fn parse_wide_table<R: Read>(
    input: R,
    schema: &SourceSchema,
    metric: Metric,
) -> Result<(WideTable, LoadReport)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    schema.validate_headers(&headers)?;

    let mut report = LoadReport::default();

    // Header index of each identifier column, in schema order.
    let id_positions: Vec<usize> = schema
        .id_columns
        .iter()
        .filter_map(|col| headers.iter().position(|h| h == col))
        .collect();

    let mut date_columns: Vec<(usize, chrono::NaiveDate)> = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        if id_positions.contains(&idx) || schema.is_ignored(header) {
            continue;
        }
        match parse_source_date(header) {
            Some(date) => date_columns.push((idx, date)),
            None => match schema.date_policy {
                DatePolicy::Strict => {
                    return Err(PipelineError::DateParse {
                        source_name: schema.name.clone(),
                        column: header.clone(),
                    });
                }
                DatePolicy::Lenient => {
                    warn!(
                        "Dropping column {:?} of {} {}: not a M/D/YY date",
                        header, schema.name, metric
                    );
                    report.dropped_columns.push(header.clone());
                }
            },
        }
    }

    let key_indices = schema.key_indices();
    let mut rows: Vec<WideRow> = Vec::new();

    for result in reader.records() {
        let record = result?;
        report.rows_read += 1;

        let identifiers: Vec<String> = id_positions
            .iter()
            .map(|&i| record.get(i).unwrap_or("").to_string())
            .collect();

        let key = RegionKey(
            key_indices
                .iter()
                .map(|&i| identifiers.get(i).cloned().unwrap_or_default())
                .collect(),
        );
        if key.is_blank() {
            report.rows_dropped_blank += 1;
            continue;
        }

        let mut values = Vec::with_capacity(date_columns.len());
        for (idx, _) in &date_columns {
            let cell = record.get(*idx).unwrap_or("");
            match parse_count(cell) {
                Ok(v) => values.push(v),
                Err(()) => match schema.date_policy {
                    DatePolicy::Strict => {
                        return Err(PipelineError::ValueParse {
                            source_name: schema.name.clone(),
                            column: headers[*idx].clone(),
                            value: cell.to_string(),
                        });
                    }
                    DatePolicy::Lenient => {
                        report.dropped_cells += 1;
                        values.push(None);
                    }
                },
            }
        }

        rows.push(WideRow {
            identifiers: Arc::from(identifiers),
            values,
        });
    }

    if report.dropped_cells > 0 {
        warn!(
            "Dropped {} unparseable {} cells from {}",
            report.dropped_cells, metric, schema.name
        );
    }

    let table = WideTable {
        source_name: schema.name.clone(),
        metric,
        id_columns: schema.id_columns.clone(),
        dates: date_columns.into_iter().map(|(_, d)| d).collect(),
        rows,
    };

    Ok((table, report))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Parse a cumulative count cell.
///
/// Empty cells are missing (`Ok(None)`). Integral floats such as `"12.0"` are
/// accepted since some exports write counts that way, provided they fit in an
/// `i64`. Negative values pass through unchanged.
fn parse_count(cell: &str) -> std::result::Result<Option<i64>, ()> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    if let Ok(v) = cell.parse::<i64>() {
        return Ok(Some(v));
    }
    // i64::MIN is exactly -2^63; i64::MAX rounds up to 2^63 as an f64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    match cell.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) => Ok(Some(f as i64)),
        _ => Err(()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::TempDir;

    const GLOBAL_CSV: &str = "\
Province/State,Country/Region,Lat,Long,1/22/20,1/23/20,1/24/20
,Italy,41.87,12.56,0,2,3
Hubei,China,30.97,112.27,444,444,549
Beijing,China,40.18,116.41,14,22,36
";

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── parse_wide_table ──────────────────────────────────────────────────────

    #[test]
    fn test_parse_global_table() {
        let (table, report) =
            parse_wide_table(GLOBAL_CSV.as_bytes(), &SourceSchema::global(), Metric::Confirmed)
                .unwrap();

        assert_eq!(table.dates, vec![ymd(2020, 1, 22), ymd(2020, 1, 23), ymd(2020, 1, 24)]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(&table.rows[1].identifiers[..2], &["Hubei".to_string(), "China".to_string()]);
        assert_eq!(table.rows[1].values, vec![Some(444), Some(444), Some(549)]);
        assert_eq!(report.rows_read, 3);
        assert!(report.dropped_columns.is_empty());
    }

    #[test]
    fn test_strict_policy_rejects_bad_date_header() {
        let csv = "Province/State,Country/Region,Lat,Long,1/22/20,not-a-date\n,Italy,1,2,0,1\n";
        let err = parse_wide_table(csv.as_bytes(), &SourceSchema::global(), Metric::Confirmed)
            .unwrap_err();
        match err {
            PipelineError::DateParse { column, .. } => assert_eq!(column, "not-a-date"),
            other => panic!("expected DateParse, got {:?}", other),
        }
    }

    #[test]
    fn test_lenient_policy_drops_bad_date_header() {
        let csv = "Province/State,Country/Region,Lat,Long,1/22/20,not-a-date\n,Italy,1,2,0,1\n";
        let schema = SourceSchema::global().with_date_policy(DatePolicy::Lenient);
        let (table, report) = parse_wide_table(csv.as_bytes(), &schema, Metric::Confirmed).unwrap();

        assert_eq!(table.dates, vec![ymd(2020, 1, 22)]);
        assert_eq!(table.rows[0].values, vec![Some(0)]);
        assert_eq!(report.dropped_columns, vec!["not-a-date".to_string()]);
    }

    #[test]
    fn test_us_table_skips_metadata_columns() {
        let csv = "\
UID,iso2,iso3,code3,FIPS,Admin2,Province_State,Country_Region,Lat,Long_,Combined_Key,Population,1/22/20,1/23/20
84001001,US,USA,840,1001.0,Autauga,Alabama,US,32.53,-86.64,\"Autauga, Alabama, US\",55869,0,1
";
        let (table, report) =
            parse_wide_table(csv.as_bytes(), &SourceSchema::us_county(), Metric::Deaths).unwrap();

        assert_eq!(table.dates.len(), 2);
        assert!(report.dropped_columns.is_empty());
        let ids = &table.rows[0].identifiers;
        assert_eq!(ids[0], "Alabama");
        assert_eq!(ids[1], "Autauga");
        assert_eq!(ids[2], "1001.0");
        assert_eq!(table.rows[0].values, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_missing_identifier_column_is_an_error() {
        let csv = "Country/Region,Lat,Long,1/22/20\nItaly,1,2,0\n";
        let err = parse_wide_table(csv.as_bytes(), &SourceSchema::global(), Metric::Confirmed)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn test_blank_key_rows_are_dropped() {
        let csv = "Province/State,Country/Region,Lat,Long,1/22/20\nSomewhere,,1,2,5\n,Italy,1,2,0\n";
        let (table, report) =
            parse_wide_table(csv.as_bytes(), &SourceSchema::global(), Metric::Confirmed).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(report.rows_dropped_blank, 1);
    }

    #[test]
    fn test_empty_and_float_cells() {
        let csv = "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20,1/24/20\n,Italy,1,2,,12.0,-3\n";
        let (table, _) =
            parse_wide_table(csv.as_bytes(), &SourceSchema::global(), Metric::Confirmed).unwrap();
        assert_eq!(table.rows[0].values, vec![None, Some(12), Some(-3)]);
    }

    #[test]
    fn test_unparseable_cell_follows_policy() {
        let csv = "Province/State,Country/Region,Lat,Long,1/22/20\n,Italy,1,2,lots\n";

        let err = parse_wide_table(csv.as_bytes(), &SourceSchema::global(), Metric::Confirmed)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ValueParse { .. }));

        let lenient = SourceSchema::global().with_date_policy(DatePolicy::Lenient);
        let (table, report) = parse_wide_table(csv.as_bytes(), &lenient, Metric::Confirmed).unwrap();
        assert_eq!(table.rows[0].values, vec![None]);
        assert_eq!(report.dropped_cells, 1);
    }

    #[test]
    fn test_out_of_range_float_cell_follows_policy() {
        let csv = "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20\n,Italy,1,2,1e300,-4.0\n";

        let err = parse_wide_table(csv.as_bytes(), &SourceSchema::global(), Metric::Confirmed)
            .unwrap_err();
        match err {
            PipelineError::ValueParse { value, .. } => assert_eq!(value, "1e300"),
            other => panic!("expected ValueParse, got {:?}", other),
        }

        let lenient = SourceSchema::global().with_date_policy(DatePolicy::Lenient);
        let (table, report) = parse_wide_table(csv.as_bytes(), &lenient, Metric::Confirmed).unwrap();
        assert_eq!(table.rows[0].values, vec![None, Some(-4)]);
        assert_eq!(report.dropped_cells, 1);
    }

    // ── read_wide_table / find_source_files ───────────────────────────────────

    #[test]
    fn test_read_wide_table_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "time_series_covid19_confirmed_global.csv", GLOBAL_CSV);
        let (table, _) = read_wide_table(&path, &SourceSchema::global(), Metric::Confirmed).unwrap();
        assert_eq!(table.metric, Metric::Confirmed);
        assert_eq!(table.cell_count(), 9);
    }

    #[test]
    fn test_read_wide_table_missing_file() {
        let err = read_wide_table(
            Path::new("/tmp/does-not-exist-covid-test.csv"),
            &SourceSchema::global(),
            Metric::Confirmed,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::FileRead { .. }));
    }

    #[test]
    fn test_find_source_files_recursive_and_partial() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("csse_covid_19_time_series");
        std::fs::create_dir_all(&nested).unwrap();
        write_file(&nested, "time_series_covid19_confirmed_US.csv", "x");
        write_file(&nested, "time_series_covid19_deaths_US.csv", "x");
        write_file(dir.path(), "time_series_covid19_confirmed_global.csv", "x");

        let files = find_source_files(dir.path(), &SourceSchema::us_county()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains_key(&Metric::Confirmed));
        assert!(files.contains_key(&Metric::Deaths));
        assert!(!files.contains_key(&Metric::Recovered));
    }

    #[test]
    fn test_find_source_files_missing_dir() {
        let err = find_source_files(
            Path::new("/tmp/does-not-exist-covid-dir-xyz"),
            &SourceSchema::global(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::DataPathNotFound(_)));
    }

    // ── parse_count ───────────────────────────────────────────────────────────

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("42"), Ok(Some(42)));
        assert_eq!(parse_count(" 7 "), Ok(Some(7)));
        assert_eq!(parse_count(""), Ok(None));
        assert_eq!(parse_count("3.0"), Ok(Some(3)));
        assert_eq!(parse_count("3.5"), Err(()));
        assert_eq!(parse_count("NaN"), Err(()));
    }
}

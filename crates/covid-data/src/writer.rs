//! CSV persistence of aggregated tables.
//!
//! Layout: the region key columns, then `Date` (ISO `YYYY-MM-DD`), the three
//! cumulative metrics and their daily deltas.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use covid_core::error::{PipelineError, Result};
use covid_core::models::{AggregatedRow, Metric, RegionKey};
use covid_core::time_utils::{format_iso_date, parse_any_date};
use tracing::debug;

use crate::table::AggregatedTable;

const DATE_COLUMN: &str = "Date";
const VALUE_COLUMNS: [&str; 6] = [
    "Confirmed",
    "Deaths",
    "Recovered",
    "New_Confirmed",
    "New_Deaths",
    "New_Recovered",
];

/// Full header row for a table keyed by `key_columns`.
pub fn output_headers(key_columns: &[String]) -> Vec<String> {
    key_columns
        .iter()
        .cloned()
        .chain(std::iter::once(DATE_COLUMN.to_string()))
        .chain(VALUE_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

/// Write `rows` under a header built from `key_columns`.
pub fn write_rows<'a, W, I>(output: W, key_columns: &[String], rows: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a AggregatedRow>,
{
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(output_headers(key_columns))?;

    let mut written = 0;
    for row in rows {
        let mut record: Vec<String> = row.region.parts().to_vec();
        record.resize(key_columns.len(), String::new());
        record.push(format_iso_date(row.date));
        for metric in Metric::ALL {
            record.push(row.cumulative(metric).to_string());
        }
        for metric in Metric::ALL {
            record.push(row.delta(metric).to_string());
        }
        writer.write_record(&record)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Write the whole table to `output`.
pub fn write_table<W: Write>(output: W, table: &AggregatedTable) -> Result<usize> {
    write_rows(output, table.key_columns(), table.rows())
}

/// Write the whole table to a CSV file, creating parent directories.
pub fn write_aggregated_csv(path: &Path, table: &AggregatedTable) -> Result<usize> {
    let file = create_file(path)?;
    let written = write_table(BufWriter::new(file), table)?;
    debug!("Wrote {} rows to {}", written, path.display());
    Ok(written)
}

/// Write only the snapshot rows chosen by `policy`.
pub fn write_snapshot_csv(
    path: &Path,
    table: &AggregatedTable,
    policy: covid_core::models::SnapshotPolicy,
) -> Result<usize> {
    let file = create_file(path)?;
    let written = write_rows(
        BufWriter::new(file),
        table.key_columns(),
        table.snapshot(policy),
    )?;
    debug!(
        "Wrote {} snapshot rows ({}) to {}",
        written,
        policy.name(),
        path.display()
    );
    Ok(written)
}

/// Load a table previously written by [`write_aggregated_csv`].
pub fn read_aggregated_csv(path: &Path) -> Result<AggregatedTable> {
    let file = File::open(path).map_err(|source| PipelineError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_aggregated(file, &path.display().to_string())
}

/// Parse the aggregated CSV layout; every column before `Date` is a key column.
///
/// Dates may be ISO or the source `M/D/YY` spelling.
pub fn parse_aggregated<R: Read>(input: R, source_name: &str) -> Result<AggregatedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let missing = |column: &str| PipelineError::MissingColumn {
        source_name: source_name.to_string(),
        column: column.to_string(),
    };
    let date_idx = headers
        .iter()
        .position(|h| h == DATE_COLUMN)
        .ok_or_else(|| missing(DATE_COLUMN))?;
    let mut value_idx = [0usize; 6];
    for (slot, name) in value_idx.iter_mut().zip(VALUE_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| missing(name))?;
    }

    let key_columns = headers[..date_idx].to_vec();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let date_text = field(date_idx);
        let date = parse_any_date(date_text).ok_or_else(|| PipelineError::DateParse {
            source_name: source_name.to_string(),
            column: date_text.to_string(),
        })?;

        let mut values = [0i64; 6];
        for (value, (&idx, name)) in values.iter_mut().zip(value_idx.iter().zip(VALUE_COLUMNS)) {
            let text = field(idx);
            *value = text.parse().map_err(|_| PipelineError::ValueParse {
                source_name: source_name.to_string(),
                column: name.to_string(),
                value: text.to_string(),
            })?;
        }

        rows.push(AggregatedRow {
            region: RegionKey::new((0..date_idx).map(field)),
            date,
            confirmed: values[0],
            deaths: values[1],
            recovered: values[2],
            new_confirmed: values[3],
            new_deaths: values[4],
            new_recovered: values[5],
        });
    }

    Ok(AggregatedTable::new(key_columns, rows))
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

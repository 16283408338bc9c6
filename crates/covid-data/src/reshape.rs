//! Wide ↔ long reshaping of a single-metric table.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use covid_core::models::{LongRecord, Metric, WideRow, WideTable};

/// Melt a wide table into one record per (row, date) cell.
///
/// Empty cells become zero-valued records so that every (row, date) key
/// reaches the aggregation stage. Records share their row's identifier
/// slice; output order is row-major, dates in column order.
pub fn melt(table: &WideTable) -> Vec<LongRecord> {
    let mut out = Vec::with_capacity(table.rows.len() * table.dates.len());
    for row in &table.rows {
        for (date, value) in table.dates.iter().zip(&row.values) {
            out.push(LongRecord {
                identifiers: Arc::clone(&row.identifiers),
                date: *date,
                metric: table.metric,
                value: value.unwrap_or(0),
            });
        }
    }
    out
}

/// Rebuild a wide table from long records of `metric`.
///
/// Rows appear in first-seen order of their identifiers and dates are sorted
/// ascending. Records of other metrics are ignored; repeated (row, date)
/// cells are summed.
pub fn pivot(
    records: &[LongRecord],
    source_name: &str,
    metric: Metric,
    id_columns: &[String],
) -> WideTable {
    let records: Vec<&LongRecord> = records.iter().filter(|r| r.metric == metric).collect();

    let dates: Vec<NaiveDate> = records
        .iter()
        .map(|r| r.date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let date_index: HashMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut row_index: HashMap<Arc<[String]>, usize> = HashMap::new();
    let mut rows: Vec<WideRow> = Vec::new();

    for record in records {
        let idx = *row_index
            .entry(Arc::clone(&record.identifiers))
            .or_insert_with(|| {
                rows.push(WideRow {
                    identifiers: Arc::clone(&record.identifiers),
                    values: vec![None; dates.len()],
                });
                rows.len() - 1
            });
        let cell = &mut rows[idx].values[date_index[&record.date]];
        *cell = Some(cell.unwrap_or(0) + record.value);
    }

    WideTable {
        source_name: source_name.to_string(),
        metric,
        id_columns: id_columns.to_vec(),
        dates,
        rows,
    }
}

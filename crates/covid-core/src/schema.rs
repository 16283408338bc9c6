//! Explicit column schemas for each raw data source.
//!
//! Every column name the pipeline touches is declared here and checked
//! against the CSV header at load time.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::Metric;

/// What to do with a date header (or value cell) that fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePolicy {
    /// Abort the load with an error.
    Strict,
    /// Drop the offending column or cell and keep going.
    Lenient,
}

impl DatePolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "strict" => Some(DatePolicy::Strict),
            "lenient" => Some(DatePolicy::Lenient),
            _ => None,
        }
    }
}

/// Column layout of one family of wide source files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Short name used in logs and errors (`"global"`, `"us"`).
    pub name: String,
    /// Suffix in `time_series_covid19_{metric}_{suffix}.csv`.
    pub file_suffix: String,
    /// Identifier columns carried verbatim through the reshape.
    pub id_columns: Vec<String>,
    /// Subset of `id_columns` forming the region key, in key order.
    pub key_columns: Vec<String>,
    pub latitude_column: Option<String>,
    pub longitude_column: Option<String>,
    /// Metadata columns that are neither identifiers nor dates.
    #[serde(default)]
    pub ignored_columns: Vec<String>,
    pub date_policy: DatePolicy,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SourceSchema {
    /// Johns Hopkins global tables, rolled up to one row per country.
    pub fn global() -> Self {
        Self {
            name: "global".to_string(),
            file_suffix: "global".to_string(),
            id_columns: strings(&["Province/State", "Country/Region", "Lat", "Long"]),
            key_columns: strings(&["Country/Region"]),
            latitude_column: Some("Lat".to_string()),
            longitude_column: Some("Long".to_string()),
            ignored_columns: Vec::new(),
            date_policy: DatePolicy::Strict,
        }
    }

    /// Global tables keyed by (province, country) so provinces stay separate.
    pub fn global_by_province() -> Self {
        Self {
            key_columns: strings(&["Province/State", "Country/Region"]),
            ..Self::global()
        }
    }

    /// Johns Hopkins US county tables.
    pub fn us_county() -> Self {
        Self {
            name: "us".to_string(),
            file_suffix: "US".to_string(),
            id_columns: strings(&["Province_State", "Admin2", "FIPS", "Lat", "Long_"]),
            key_columns: strings(&["Province_State", "Admin2", "FIPS"]),
            latitude_column: Some("Lat".to_string()),
            longitude_column: Some("Long_".to_string()),
            ignored_columns: strings(&[
                "UID",
                "iso2",
                "iso3",
                "code3",
                "Country_Region",
                "Combined_Key",
                "Population",
            ]),
            date_policy: DatePolicy::Lenient,
        }
    }

    /// Resolve a preset by its CLI name.
    pub fn preset(name: &str, by_province: bool) -> Option<Self> {
        match name {
            "global" if by_province => Some(Self::global_by_province()),
            "global" => Some(Self::global()),
            "us" => Some(Self::us_county()),
            _ => None,
        }
    }

    pub fn with_date_policy(mut self, policy: DatePolicy) -> Self {
        self.date_policy = policy;
        self
    }

    /// File name of the wide table for `metric`.
    pub fn file_name(&self, metric: Metric) -> String {
        format!(
            "time_series_covid19_{}_{}.csv",
            metric.file_token(),
            self.file_suffix
        )
    }

    /// Check internal consistency of the schema itself.
    pub fn validate(&self) -> Result<()> {
        if self.id_columns.is_empty() {
            return Err(PipelineError::Config(format!(
                "schema {} declares no identifier columns",
                self.name
            )));
        }
        if self.key_columns.is_empty() {
            return Err(PipelineError::Config(format!(
                "schema {} declares no key columns",
                self.name
            )));
        }
        let coords = self
            .latitude_column
            .iter()
            .chain(self.longitude_column.iter());
        for col in self.key_columns.iter().chain(coords) {
            if !self.id_columns.contains(col) {
                return Err(PipelineError::Config(format!(
                    "schema {}: column {:?} is not an identifier column",
                    self.name, col
                )));
            }
        }
        Ok(())
    }

    /// Check that every identifier column is present in `headers`.
    pub fn validate_headers<S: AsRef<str>>(&self, headers: &[S]) -> Result<()> {
        for col in &self.id_columns {
            if !headers.iter().any(|h| h.as_ref().trim() == col) {
                return Err(PipelineError::MissingColumn {
                    source_name: self.name.clone(),
                    column: col.clone(),
                });
            }
        }
        Ok(())
    }

    /// Positions of the key columns within `id_columns`.
    pub fn key_indices(&self) -> Vec<usize> {
        self.key_columns
            .iter()
            .filter_map(|k| self.id_columns.iter().position(|c| c == k))
            .collect()
    }

    /// Positions of the latitude / longitude columns within `id_columns`.
    pub fn coordinate_indices(&self) -> Option<(usize, usize)> {
        let position = |name: &Option<String>| {
            name.as_ref()
                .and_then(|n| self.id_columns.iter().position(|c| c == n))
        };
        Some((
            position(&self.latitude_column)?,
            position(&self.longitude_column)?,
        ))
    }

    /// `true` for columns that are neither identifiers nor dates.
    pub fn is_ignored(&self, column: &str) -> bool {
        self.ignored_columns.iter().any(|c| c == column)
    }
}

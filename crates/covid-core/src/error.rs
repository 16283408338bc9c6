use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the aggregation pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV document could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A date column header did not match `M/D/YY` under the strict policy.
    #[error("Invalid date column {column:?} in source {source_name}")]
    DateParse { source_name: String, column: String },

    /// A cell value was not an integer count under the strict policy.
    #[error("Invalid value {value:?} in column {column:?} of source {source_name}")]
    ValueParse {
        source_name: String,
        column: String,
        value: String,
    },

    /// A required identifier column is absent from the header row.
    #[error("Source {source_name} is missing column {column:?}")]
    MissingColumn { source_name: String, column: String },

    /// The expected data directory does not exist.
    #[error("Data path not found: {0}")]
    DataPathNotFound(PathBuf),

    /// No usable source files were found under the given directory.
    #[error("No source CSV files found in {0}")]
    NoDataFiles(PathBuf),

    /// Two rows share a region and date after aggregation.
    #[error("Duplicate observation for region {region} on {date}")]
    DuplicateObservation { region: String, date: String },

    /// A remote timeline request failed.
    #[error("Remote source error: {0}")]
    Remote(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PipelineError>;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use covid_core::models::Metric;
use covid_core::schema::SourceSchema;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the `~/.covid-aggregator/` directory hierarchy exists.
///
/// Creates the following directories if absent (including any missing parents):
/// - `~/.covid-aggregator/`
/// - `~/.covid-aggregator/logs/`
/// - `~/.covid-aggregator/data/`
pub fn ensure_directories() -> anyhow::Result<()> {
    let app_dir = app_dir();
    std::fs::create_dir_all(&app_dir)?;
    std::fs::create_dir_all(app_dir.join("logs"))?;
    std::fs::create_dir_all(app_dir.join("data"))?;
    Ok(())
}

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".covid-aggregator")
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `DEBUG`/`INFO`/`WARNING`/`ERROR`/`CRITICAL` name to a filter directive.
fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        other => other.to_lowercase(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to stderr, or is appended to `log_file` when one is given.
/// Unrecognised levels fall back to `info`.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let (stderr_layer, file_layer) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file));
            (None, Some(layer))
        }
        None => (
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

// ── Data-directory discovery ───────────────────────────────────────────────────

/// Locate a directory holding `schema`'s confirmed-cases file.
///
/// Checks the following directories in order and returns the first that
/// contains the file:
/// 1. the current directory
/// 2. `./dataset/`
/// 3. `./data/`
/// 4. `~/.covid-aggregator/data/`
pub fn discover_data_dir(schema: &SourceSchema) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    discover_data_dir_in(&cwd, &app_dir().join("data"), schema)
}

fn discover_data_dir_in(cwd: &Path, app_data: &Path, schema: &SourceSchema) -> Option<PathBuf> {
    let wanted = schema.file_name(Metric::Confirmed);
    let candidates = [
        cwd.to_path_buf(),
        cwd.join("dataset"),
        cwd.join("data"),
        app_data.to_path_buf(),
    ];
    candidates.into_iter().find(|dir| dir.join(&wanted).is_file())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

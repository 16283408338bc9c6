use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::models::SnapshotPolicy;
use crate::schema::{DatePolicy, SourceSchema};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Aggregate COVID-19 time-series tables into a tidy daily table
#[derive(Parser, Debug, Clone)]
#[command(
    name = "covid-aggregator",
    about = "Aggregate COVID-19 time-series tables into a tidy daily table",
    version
)]
pub struct Settings {
    /// Directory holding the time_series_covid19_*.csv files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Source table family
    #[arg(long, default_value = "global", value_parser = ["global", "us"])]
    pub source: String,

    /// Keep provinces separate instead of rolling them into their country
    #[arg(long)]
    pub by_province: bool,

    /// How to treat unparseable date columns (auto uses the source default)
    #[arg(long, default_value = "auto", value_parser = ["auto", "strict", "lenient"])]
    pub date_policy: String,

    /// Output CSV path for the aggregated table
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Optional CSV path for the latest snapshot
    #[arg(long)]
    pub snapshot_output: Option<PathBuf>,

    /// Which rows count as the latest snapshot
    #[arg(long, default_value = "global-max", value_parser = ["global-max", "last-per-region"])]
    pub snapshot_policy: String,

    /// Number of regions listed in the run summary
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Base URL of a historical timeline API used instead of local files
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Region to request from the remote API (repeatable)
    #[arg(long = "region")]
    pub regions: Vec<String>,

    /// Keep running and rebuild the table every refresh interval
    #[arg(long)]
    pub watch: bool,

    /// Refresh interval in seconds for --watch (1-86400)
    #[arg(long, default_value = "3600", value_parser = clap::value_parser!(u64).range(1..=86400))]
    pub refresh_rate: u64,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

/// Resolved inputs of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub schema: SourceSchema,
    pub snapshot_policy: SnapshotPolicy,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.covid-aggregator/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_policy: Option<String>,
}

impl LastUsedParams {
    /// Default path: `~/.covid-aggregator/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".covid-aggregator").join("last_used.json")
    }

    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to `path`, creating parent directories if needed.
    pub fn save_to(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at `path` if it exists.
    pub fn clear_at(path: &Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with an explicit argument
    /// list and config path.
    pub fn load_with_last_used_impl(args: Vec<std::ffi::OsString>, config_path: &Path) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!("Failed to clear {}: {}", config_path.display(), e);
            }
            return Self::resolve_values(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins.
        if settings.data_dir.is_none() {
            settings.data_dir = last.data_dir;
        }
        if settings.output.is_none() {
            settings.output = last.output;
        }
        if !is_arg_explicitly_set(&matches, "source") {
            if let Some(v) = last.source {
                settings.source = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "snapshot_policy") {
            if let Some(v) = last.snapshot_policy {
                settings.snapshot_policy = v;
            }
        }

        settings = Self::resolve_values(settings);

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::debug!("Could not persist last-used params: {}", e);
        }

        settings
    }

    /// Apply the `--debug` flag.
    fn resolve_values(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Build the validated pipeline configuration.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut schema = SourceSchema::preset(&self.source, self.by_province)
            .ok_or_else(|| PipelineError::Config(format!("unknown source {:?}", self.source)))?;

        match self.date_policy.as_str() {
            "auto" => {}
            other => {
                let policy = DatePolicy::from_name(other).ok_or_else(|| {
                    PipelineError::Config(format!("unknown date policy {:?}", other))
                })?;
                schema = schema.with_date_policy(policy);
            }
        }
        schema.validate()?;

        let snapshot_policy = SnapshotPolicy::from_name(&self.snapshot_policy).ok_or_else(|| {
            PipelineError::Config(format!(
                "unknown snapshot policy {:?}",
                self.snapshot_policy
            ))
        })?;

        Ok(PipelineConfig {
            data_dir: self.data_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            schema,
            snapshot_policy,
        })
    }

    /// Output path, falling back to `{source}_covid19_dataset.csv`.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_covid19_dataset.csv", self.source)))
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            data_dir: s.data_dir.clone(),
            source: Some(s.source.clone()),
            output: s.output.clone(),
            snapshot_policy: Some(s.snapshot_policy.clone()),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            data_dir: Some(PathBuf::from("/data/jhu")),
            source: Some("us".to_string()),
            output: Some(PathBuf::from("out.csv")),
            snapshot_policy: Some("last-per-region".to_string()),
        };
        params.save_to(&path).expect("save");

        let loaded = LastUsedParams::load_from(&path);
        assert_eq!(loaded.data_dir, Some(PathBuf::from("/data/jhu")));
        assert_eq!(loaded.source, Some("us".to_string()));
        assert_eq!(loaded.output, Some(PathBuf::from("out.csv")));
        assert_eq!(loaded.snapshot_policy, Some("last-per-region".to_string()));
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams {
            source: Some("global".to_string()),
            ..Default::default()
        }
        .save_to(&path)
        .expect("save");
        assert!(path.exists());

        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists());
    }

    #[test]
    fn test_last_used_params_default_when_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let loaded = LastUsedParams::load_from(&tmp_config_path(&tmp));
        assert!(loaded.data_dir.is_none());
        assert!(loaded.source.is_none());
    }

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["covid-aggregator"]);
        assert!(settings.data_dir.is_none());
        assert_eq!(settings.source, "global");
        assert!(!settings.by_province);
        assert_eq!(settings.date_policy, "auto");
        assert_eq!(settings.snapshot_policy, "global-max");
        assert_eq!(settings.top, 10);
        assert!(settings.regions.is_empty());
        assert!(!settings.watch);
        assert_eq!(settings.refresh_rate, 3600);
        assert_eq!(settings.log_level, "INFO");
        assert!(!settings.debug);
    }

    #[test]
    fn test_settings_repeatable_region() {
        let settings = Settings::parse_from([
            "covid-aggregator",
            "--remote-url",
            "https://example.test/historical",
            "--region",
            "Italy",
            "--region",
            "India",
        ]);
        assert_eq!(settings.regions, vec!["Italy", "India"]);
        assert_eq!(
            settings.remote_url.as_deref(),
            Some("https://example.test/historical")
        );
    }

    #[test]
    fn test_pipeline_config_uses_source_defaults() {
        let settings = Settings::parse_from(["covid-aggregator", "--source", "us"]);
        let config = settings.pipeline_config().expect("config");
        assert_eq!(config.schema.name, "us");
        assert_eq!(config.schema.date_policy, DatePolicy::Lenient);
        assert_eq!(config.snapshot_policy, SnapshotPolicy::GlobalMaxDate);
        assert_eq!(config.data_dir, PathBuf::from("."));
    }

    #[test]
    fn test_pipeline_config_overrides() {
        let settings = Settings::parse_from([
            "covid-aggregator",
            "--by-province",
            "--date-policy",
            "lenient",
            "--snapshot-policy",
            "last-per-region",
        ]);
        let config = settings.pipeline_config().expect("config");
        assert_eq!(config.schema.key_columns.len(), 2);
        assert_eq!(config.schema.date_policy, DatePolicy::Lenient);
        assert_eq!(config.snapshot_policy, SnapshotPolicy::LastPerRegion);
    }

    #[test]
    fn test_load_with_last_used_merges_persisted_source() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            source: Some("us".to_string()),
            data_dir: Some(PathBuf::from("/srv/jhu")),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings =
            Settings::load_with_last_used_impl(vec!["covid-aggregator".into()], &config_path);
        assert_eq!(settings.source, "us");
        assert_eq!(settings.data_dir, Some(PathBuf::from("/srv/jhu")));
        assert_eq!(settings.output_path(), PathBuf::from("us_covid19_dataset.csv"));
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            source: Some("us".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(
            vec!["covid-aggregator".into(), "--source".into(), "global".into()],
            &config_path,
        );
        assert_eq!(settings.source, "global");
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams::default()
            .save_to(&config_path)
            .expect("save");

        Settings::load_with_last_used_impl(
            vec!["covid-aggregator".into(), "--clear".into()],
            &config_path,
        );
        assert!(!config_path.exists());
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Settings::load_with_last_used_impl(
            vec!["covid-aggregator".into(), "--debug".into()],
            &tmp_config_path(&tmp),
        );
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_load_with_last_used_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        Settings::load_with_last_used_impl(
            vec![
                "covid-aggregator".into(),
                "--data-dir".into(),
                "/tmp/jhu".into(),
            ],
            &config_path,
        );

        let loaded = LastUsedParams::load_from(&config_path);
        assert_eq!(loaded.data_dir, Some(PathBuf::from("/tmp/jhu")));
        assert_eq!(loaded.source, Some("global".to_string()));
    }
}

//! TTL-cached data manager for the refresh runtime.
//!
//! Wraps the pipeline entry points with a time-to-live cache and retry logic.
//! Callers use [`DataManager::get_data`] to obtain a fresh-or-cached
//! [`PipelineOutput`]; the manager handles staleness checks, up to three
//! attempts with linear back-off, and fallback to the previous output when
//! every attempt fails.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use covid_core::error::Result;
use covid_core::settings::PipelineConfig;
use covid_data::analysis::{run_pipeline, run_remote_pipeline, PipelineOutput};
use covid_data::remote::TimelineSource;

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Default cache TTL in seconds. The upstream tables change at most daily.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Maximum number of attempts before giving up and returning stale data.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Added to the sleep before each retry.
const RETRY_STEP_MS: u64 = 100;

// ── PipelineSource ────────────────────────────────────────────────────────────

/// Where a pipeline run reads its data from.
#[derive(Clone)]
pub enum PipelineSource {
    /// Wide CSV files on disk.
    Local(PipelineConfig),
    /// Per-region timelines from a remote API.
    Remote {
        source: Arc<dyn TimelineSource>,
        regions: Vec<String>,
    },
}

impl PipelineSource {
    /// Run the pipeline once.
    pub fn run(&self) -> Result<PipelineOutput> {
        match self {
            PipelineSource::Local(config) => run_pipeline(config),
            PipelineSource::Remote { source, regions } => {
                run_remote_pipeline(source.as_ref(), regions)
            }
        }
    }
}

impl fmt::Debug for PipelineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineSource::Local(config) => f.debug_tuple("Local").field(config).finish(),
            PipelineSource::Remote { regions, .. } => f
                .debug_struct("Remote")
                .field("regions", regions)
                .finish_non_exhaustive(),
        }
    }
}

// ── DataManager ───────────────────────────────────────────────────────────────

/// TTL-cached wrapper around the pipeline.
///
/// # Example
/// ```no_run
/// use covid_runtime::data_manager::{DataManager, PipelineSource};
/// use covid_runtime::core::settings::Settings;
///
/// let settings = Settings::load_with_last_used();
/// let config = settings.pipeline_config().unwrap();
/// let mut mgr = DataManager::new(3600, PipelineSource::Local(config));
/// if let Some(output) = mgr.get_data(false) {
///     println!("rows: {}", output.table.len());
/// }
/// ```
#[derive(Debug)]
pub struct DataManager {
    /// Maximum age of cached data before it is considered stale.
    cache_ttl: Duration,
    source: PipelineSource,
    /// Most recent successful output.
    cache: Option<PipelineOutput>,
    /// When the cache was last populated.
    cache_timestamp: Option<Instant>,
    /// Description of the last error encountered.
    last_error: Option<String>,
}

impl DataManager {
    pub fn new(cache_ttl_secs: u64, source: PipelineSource) -> Self {
        Self {
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            source,
            cache: None,
            cache_timestamp: None,
            last_error: None,
        }
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Return pipeline output, using the cache while it is within its TTL.
    ///
    /// When `force_refresh` is `true` the cache is bypassed. If every attempt
    /// fails the previous output (if any) is returned and
    /// [`DataManager::last_error`] describes the failure.
    pub fn get_data(&mut self, force_refresh: bool) -> Option<&PipelineOutput> {
        if !force_refresh && self.is_cache_valid() {
            tracing::debug!("returning cached pipeline output");
            return self.cache.as_ref();
        }

        match self.fetch_with_retry() {
            Ok(output) => {
                tracing::debug!(
                    rows = output.metadata.rows,
                    regions = output.metadata.regions,
                    "pipeline cache updated"
                );
                self.cache = Some(output);
                self.cache_timestamp = Some(Instant::now());
                self.last_error = None;
                self.cache.as_ref()
            }
            Err(e) => {
                tracing::warn!(error = %e, "pipeline failed; falling back to cached output");
                self.last_error = Some(e);
                self.cache.as_ref()
            }
        }
    }

    /// Discard the current cache so the next [`DataManager::get_data`] runs
    /// the pipeline.
    pub fn invalidate_cache(&mut self) {
        self.cache = None;
        self.cache_timestamp = None;
        tracing::debug!("cache invalidated");
    }

    /// Age of the current cache entry, or `None` before the first success.
    pub fn cache_age(&self) -> Option<Duration> {
        self.cache_timestamp.map(|ts| ts.elapsed())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn source(&self) -> &PipelineSource {
        &self.source
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn is_cache_valid(&self) -> bool {
        match (self.cache.as_ref(), self.cache_timestamp) {
            (Some(_), Some(ts)) => ts.elapsed() < self.cache_ttl,
            _ => false,
        }
    }

    /// Back-off schedule: attempt 1 → 0 ms, attempt 2 → 100 ms, attempt 3 → 200 ms.
    fn fetch_with_retry(&self) -> std::result::Result<PipelineOutput, String> {
        let mut last_err = String::new();

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                let sleep_ms = u64::from(attempt) * RETRY_STEP_MS;
                tracing::debug!(attempt, sleep_ms, "retrying pipeline after back-off");
                thread::sleep(Duration::from_millis(sleep_ms));
            }

            match self.source.run() {
                Ok(output) => return Ok(output),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "pipeline attempt failed");
                    last_err = e.to_string();
                }
            }
        }

        Err(last_err)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Remote per-region timelines (`{base}/{region}?lastdays=all`).
//!
//! Each region's JSON carries cumulative `cases`, `deaths` and `recovered`
//! maps keyed by `M/D/YY`. A region whose request fails contributes nothing;
//! the failure is logged and recorded, and the batch continues.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use covid_core::error::{PipelineError, Result};
use covid_core::models::{LongRecord, Metric};
use covid_core::time_utils::parse_source_date;
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

/// Cumulative series for one region as served by the remote API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub cases: BTreeMap<String, i64>,
    #[serde(default)]
    pub deaths: BTreeMap<String, i64>,
    #[serde(default)]
    pub recovered: BTreeMap<String, i64>,
}

impl Timeline {
    pub fn series(&self, metric: Metric) -> &BTreeMap<String, i64> {
        match metric {
            Metric::Confirmed => &self.cases,
            Metric::Deaths => &self.deaths,
            Metric::Recovered => &self.recovered,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    timeline: Timeline,
}

/// Anything that can produce a region's timeline.
pub trait TimelineSource: Send + Sync {
    fn fetch_timeline(&self, region: &str) -> Result<Timeline>;
}

/// Blocking HTTP implementation of [`TimelineSource`].
#[derive(Debug, Clone)]
pub struct HttpTimelineSource {
    client: Client,
    base_url: Url,
}

impl HttpTimelineSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PipelineError::Config(format!("Invalid remote URL {base_url:?}: {e}")))?;
        let client = Client::builder()
            .user_agent(concat!("covid-aggregator/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Remote(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    /// Request URL for `region`.
    pub fn region_url(&self, region: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PipelineError::Config(format!("Remote URL {} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .push(region);
        url.query_pairs_mut().clear().append_pair("lastdays", "all");
        Ok(url)
    }
}

impl TimelineSource for HttpTimelineSource {
    fn fetch_timeline(&self, region: &str) -> Result<Timeline> {
        let url = self.region_url(region)?;
        debug!("Fetching timeline: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| PipelineError::Remote(format!("Request for {region} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(PipelineError::Remote(format!(
                "Timeline API error for {region}: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .map_err(|e| PipelineError::Remote(format!("Failed to read body for {region}: {e}")))?;
        parse_timeline(&body)
    }
}

/// Parse a timeline response body.
pub fn parse_timeline(body: &str) -> Result<Timeline> {
    let response: TimelineResponse = serde_json::from_str(body)?;
    Ok(response.timeline)
}

/// Long records for one region; keys that are not `M/D/YY` dates are skipped.
pub fn timeline_to_records(region: &str, timeline: &Timeline) -> Vec<LongRecord> {
    let identifiers: Arc<[String]> = Arc::from(vec![region.to_string()]);
    let mut records = Vec::new();
    for metric in Metric::ALL {
        for (key, value) in timeline.series(metric) {
            match parse_source_date(key) {
                Some(date) => records.push(LongRecord {
                    identifiers: Arc::clone(&identifiers),
                    date,
                    metric,
                    value: *value,
                }),
                None => debug!("Skipping timeline key {:?} for {}", key, region),
            }
        }
    }
    records
}

/// Records gathered from a batch of regions.
#[derive(Debug, Clone, Default)]
pub struct RemoteBatch {
    pub confirmed: Vec<LongRecord>,
    pub deaths: Vec<LongRecord>,
    pub recovered: Vec<LongRecord>,
    /// Regions that contributed data, in request order.
    pub fetched: Vec<String>,
    /// Regions that contributed nothing because their fetch failed.
    pub failed: Vec<String>,
}

/// Fetch every distinct region in turn and split the records by metric.
///
/// Names are trimmed; blank and repeated names are skipped so a region is
/// never counted twice.
pub fn collect_remote_records(source: &dyn TimelineSource, regions: &[String]) -> RemoteBatch {
    let mut batch = RemoteBatch::default();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for region in regions {
        let region = region.trim();
        if region.is_empty() {
            continue;
        }
        if !seen.insert(region) {
            debug!("Skipping repeated region {}", region);
            continue;
        }
        match source.fetch_timeline(region) {
            Ok(timeline) => {
                batch.fetched.push(region.to_string());
                for record in timeline_to_records(region, &timeline) {
                    match record.metric {
                        Metric::Confirmed => batch.confirmed.push(record),
                        Metric::Deaths => batch.deaths.push(record),
                        Metric::Recovered => batch.recovered.push(record),
                    }
                }
            }
            Err(e) => {
                warn!("Region {} contributes no data: {}", region, e);
                batch.failed.push(region.to_string());
            }
        }
    }
    batch
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// In-memory source serving canned bodies; unknown regions fail.
    pub(crate) struct FakeSource {
        pub bodies: BTreeMap<String, String>,
    }

    impl FakeSource {
        pub fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                bodies: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    impl TimelineSource for FakeSource {
        fn fetch_timeline(&self, region: &str) -> Result<Timeline> {
            match self.bodies.get(region) {
                Some(body) => parse_timeline(body),
                None => Err(PipelineError::Remote(format!("404 for {region}"))),
            }
        }
    }

    pub(crate) const ITALY: &str = r#"{
        "country": "Italy",
        "timeline": {
            "cases": {"1/22/20": 0, "1/23/20": 2, "1/24/20": 3},
            "deaths": {"1/22/20": 0, "1/23/20": 0, "1/24/20": 1},
            "recovered": {"1/22/20": 0, "1/23/20": 0, "1/24/20": 0}
        }
    }"#;

    #[test]
    fn test_parse_timeline_defaults_missing_series() {
        let timeline = parse_timeline(r#"{"timeline": {"cases": {"1/22/20": 5}}}"#).unwrap();
        assert_eq!(timeline.cases.len(), 1);
        assert!(timeline.deaths.is_empty());
        assert!(timeline.recovered.is_empty());

        let empty = parse_timeline("{}").unwrap();
        assert_eq!(empty, Timeline::default());
    }

    #[test]
    fn test_parse_timeline_rejects_malformed_json() {
        assert!(matches!(
            parse_timeline("not json"),
            Err(PipelineError::JsonParse(_))
        ));
    }

    #[test]
    fn test_timeline_to_records_skips_bad_keys() {
        let timeline = parse_timeline(
            r#"{"timeline": {"cases": {"1/22/20": 5, "yesterday": 9}, "deaths": {"1/22/20": 1}}}"#,
        )
        .unwrap();
        let records = timeline_to_records("Chile", &timeline);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metric, Metric::Confirmed);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2020, 1, 22).unwrap());
        assert_eq!(&*records[0].identifiers, &["Chile".to_string()]);
        assert!(Arc::ptr_eq(&records[0].identifiers, &records[1].identifiers));
    }

    #[test]
    fn test_collect_remote_records_continues_past_failures() {
        let source = FakeSource::new(&[("Italy", ITALY)]);
        let regions = vec!["Italy".to_string(), "Atlantis".to_string(), " ".to_string()];
        let batch = collect_remote_records(&source, &regions);

        assert_eq!(batch.confirmed.len(), 3);
        assert_eq!(batch.deaths.len(), 3);
        assert_eq!(batch.recovered.len(), 3);
        assert_eq!(batch.failed, vec!["Atlantis".to_string()]);
        assert_eq!(batch.fetched, vec!["Italy".to_string()]);
    }

    #[test]
    fn test_collect_remote_records_fetches_each_region_once() {
        let source = FakeSource::new(&[("Italy", ITALY)]);
        let regions = vec!["Italy".to_string(), " Italy ".to_string()];
        let batch = collect_remote_records(&source, &regions);

        assert_eq!(batch.fetched, vec!["Italy".to_string()]);
        let cases: Vec<i64> = batch.confirmed.iter().map(|r| r.value).collect();
        assert_eq!(cases, vec![0, 2, 3]);
    }

    #[test]
    fn test_region_url() {
        let source = HttpTimelineSource::new("https://disease.sh/v3/covid-19/historical/").unwrap();
        let url = source.region_url("South Africa").unwrap();
        assert_eq!(
            url.as_str(),
            "https://disease.sh/v3/covid-19/historical/South%20Africa?lastdays=all"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpTimelineSource::new("not a url"),
            Err(PipelineError::Config(_))
        ));
    }
}

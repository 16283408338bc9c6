//! Date parsing and formatting for source headers and output files.
//!
//! Source tables label their value columns `M/D/YY` (`1/22/20`); persisted
//! output uses ISO `YYYY-MM-DD`.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

/// ISO output format.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

fn source_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2})$").expect("regex is valid"))
}

/// Parse a `M/D/YY` source header such as `"1/22/20"`.
///
/// Two-digit years are taken to be in the 2000s. Returns `None` for anything
/// that is not exactly that shape or names an impossible calendar day.
pub fn parse_source_date(s: &str) -> Option<NaiveDate> {
    let caps = source_date_regex().captures(s.trim())?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), ISO_DATE_FORMAT).ok()
}

/// Accept either the source or the ISO spelling.
pub fn parse_any_date(s: &str) -> Option<NaiveDate> {
    parse_source_date(s).or_else(|| parse_iso_date(s))
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_iso_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

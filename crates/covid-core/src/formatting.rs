/// Format an integer count with thousands separators.
///
/// # Examples
///
/// ```
/// use covid_core::formatting::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234567), "1,234,567");
/// assert_eq!(format_count(-9876), "-9,876");
/// ```
pub fn format_count(value: i64) -> String {
    let grouped = group_thousands(&value.unsigned_abs().to_string());
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Format a daily delta with an explicit sign.
///
/// Zero is rendered without a sign.
///
/// # Examples
///
/// ```
/// use covid_core::formatting::format_delta;
///
/// assert_eq!(format_delta(1500), "+1,500");
/// assert_eq!(format_delta(-3), "-3");
/// assert_eq!(format_delta(0), "0");
/// ```
pub fn format_delta(value: i64) -> String {
    if value > 0 {
        format!("+{}", format_count(value))
    } else {
        format_count(value)
    }
}

/// Calculate `(part / whole) * 100`, rounded to `decimal_places`.
///
/// Returns `0.0` if `whole` is zero.
///
/// # Examples
///
/// ```
/// use covid_core::formatting::percentage;
///
/// assert!((percentage(3, 200, 1) - 1.5).abs() < 1e-9);
/// assert_eq!(percentage(5, 0, 2), 0.0);
/// ```
pub fn percentage(part: i64, whole: i64, decimal_places: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let raw = (part as f64 / whole as f64) * 100.0;
    let factor = 10_f64.powi(decimal_places as i32);
    (raw * factor).round() / factor
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of a digit string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

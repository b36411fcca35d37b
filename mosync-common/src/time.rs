//! Timestamp utilities and clock-value parsing
//!
//! Timeline clip times are carried as `f64` seconds (the unit narration
//! timing is authored in); aggregate durations and offsets are `f64`
//! milliseconds. Clock values follow the SMIL grammar:
//!
//! - Full clock: `hh:mm:ss(.fff)`
//! - Partial clock: `mm:ss(.fff)`
//! - Timecount: `N(.N)` with optional metric `h`, `min`, `s` or `ms`
//!   (bare numbers are seconds)

use chrono::{DateTime, Utc};

/// Wall-clock timestamp stamped on every published event
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Timer delay from a millisecond setting
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Seconds to milliseconds. Infinite inputs stay infinite.
pub fn secs_to_ms(secs: f64) -> f64 {
    secs * 1000.0
}

/// Milliseconds to seconds.
pub fn ms_to_secs(ms: f64) -> f64 {
    ms / 1000.0
}

/// Parse a SMIL clock value into seconds.
///
/// Returns `None` for anything that is not a finite, well-formed clock value.
///
/// # Examples
///
/// ```
/// use mosync_common::time::parse_clock_value;
///
/// assert_eq!(parse_clock_value("2.5"), Some(2.5));
/// assert_eq!(parse_clock_value("1500ms"), Some(1.5));
/// assert_eq!(parse_clock_value("0:01:02.5"), Some(62.5));
/// assert_eq!(parse_clock_value("01:30"), Some(90.0));
/// assert_eq!(parse_clock_value("abc"), None);
/// ```
pub fn parse_clock_value(raw: &str) -> Option<f64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if value.contains(':') {
        return parse_clock(value);
    }

    let (number, scale) = if let Some(n) = value.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = value.strip_suffix("min") {
        (n, 60.0)
    } else if let Some(n) = value.strip_suffix('h') {
        (n, 3600.0)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1.0)
    } else {
        (value, 1.0)
    };

    let parsed: f64 = number.trim().parse().ok()?;
    let secs = parsed * scale;
    secs.is_finite().then_some(secs)
}

fn parse_clock(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };
    let seconds: f64 = seconds.parse().ok()?;
    if !(0.0..60.0).contains(&seconds) || (parts.len() == 3 && minutes >= 60) {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

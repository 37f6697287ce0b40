//! Lightweight cron expression evaluator.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Field syntax: *, N, M-N, */S, M-N/S, and comma lists of any of these.
//! Example: "0 8 * * 1-5" = weekdays at 8:00
//!
//! No cron crate dependency: matching is evaluated field by field against a
//! concrete instant, and the next run is found by probing minute by minute.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use logiflow_core::error::{LogiflowError, Result};

/// Maximum number of minute candidates checked by [`next_run`] (24 hours).
pub const SEARCH_WINDOW_MINUTES: u32 = 24 * 60;

/// Check whether `instant` satisfies a 5-field cron expression.
///
/// Malformed expressions (wrong field count) never match. Within a field, an
/// unparseable number or a non-positive step makes that field never match.
pub fn matches(expression: &str, instant: &DateTime<Utc>) -> bool {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 {
        return false;
    }

    let values = [
        instant.minute(),
        instant.hour(),
        instant.day(),
        instant.month(),
        instant.weekday().num_days_from_sunday(),
    ];

    parts
        .iter()
        .zip(values)
        .all(|(field, value)| field_matches(field, value))
}

/// Compute the first minute strictly after `after` that matches `expression`.
///
/// The search starts at the next whole minute and stops after
/// [`SEARCH_WINDOW_MINUTES`] candidates; when nothing matches in that window
/// the result is `after + 1h`, so a never-matching rule still moves forward.
pub fn next_run(expression: &str, after: DateTime<Utc>) -> DateTime<Utc> {
    let mut candidate = truncate_to_minute(after) + Duration::minutes(1);

    for _ in 0..SEARCH_WINDOW_MINUTES {
        if matches(expression, &candidate) {
            return candidate;
        }
        candidate += Duration::minutes(1);
    }

    tracing::debug!(
        "⏳ No match for '{}' within 24h of {}, falling back to +1h",
        expression,
        after
    );
    after + Duration::hours(1)
}

/// Upcoming run times, each computed from the previous one.
pub fn upcoming(expression: &str, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    let mut runs = Vec::with_capacity(count);
    let mut cursor = after;
    for _ in 0..count {
        cursor = next_run(expression, cursor);
        runs.push(cursor);
    }
    runs
}

/// Structural validation: exactly five non-empty fields.
///
/// This is stricter than [`matches`] only in that it reports *why* an
/// expression can never fire; matching itself never consults it.
pub fn validate(expression: &str) -> Result<()> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(LogiflowError::Cron {
            expression: expression.to_string(),
            reason: format!("need 5 fields (MIN HOUR DOM MON DOW), got {fields}"),
        });
    }
    Ok(())
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(t)
}

/// Match a single cron field against a calendar value.
fn field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }

    // Comma-separated: "0,15,30-45"
    if field.contains(',') {
        return field.split(',').any(|part| field_matches(part, value));
    }

    // Step: "*/N", "M-N/S", or "X/S"
    if let Some((range, step)) = field.split_once('/') {
        let step = match parse_number(step) {
            Some(s) if s > 0 => s,
            _ => return false,
        };
        if range == "*" {
            return value % step == 0;
        }
        if let Some((lo, hi)) = parse_range(range) {
            return lo <= value && value <= hi && (value - lo) % step == 0;
        }
        return value % step == 0;
    }

    // Range: "9-17"
    if field.contains('-') {
        return match parse_range(field) {
            Some((lo, hi)) => lo <= value && value <= hi,
            None => false,
        };
    }

    parse_number(field) == Some(value)
}

fn parse_range(field: &str) -> Option<(u32, u32)> {
    let (lo, hi) = field.split_once('-')?;
    Some((parse_number(lo)?, parse_number(hi)?))
}

fn parse_number(s: &str) -> Option<u32> {
    s.trim().parse().ok()
}

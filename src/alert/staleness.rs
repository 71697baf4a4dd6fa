/// Reading staleness detection.
///
/// Aggregator gauges normally report every 15 minutes. A reading that has
/// stopped advancing still classifies normally, so the monitor flags it
/// separately and the panel can show that the value is old.
///
/// `now` is always passed in; the monitor supplies its refresh instant.

use chrono::{DateTime, TimeZone};

use crate::hst::HstDateTime;

/// Returns `true` if `timestamp` is more than `max_age_minutes` before `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
///
/// A timestamp in the future is never stale.
pub fn is_stale_at<Tz: TimeZone>(
    timestamp: &HstDateTime,
    max_age_minutes: u64,
    now: DateTime<Tz>,
) -> bool {
    let age = now.fixed_offset() - *timestamp;
    let max_age_secs = i64::try_from(max_age_minutes)
        .unwrap_or(i64::MAX / 60)
        .saturating_mul(60);
    age.num_seconds() > max_age_secs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Current-value, trend and classification resolution for a time series.
///
/// Every source (stream, tide, rain) arrives as a small unordered array of
/// timestamped samples. `resolve` answers "what is the reading right now,
/// which way is it heading, and how worried should we be?" the same way for
/// all of them; each source only declares its thresholds and compare mode.
///
/// The integration tests at the bottom of this module exercise the full
/// parse → resolve pipeline against the fixture payloads.

use crate::hst::HstDateTime;
use crate::model::{
    CompareMode, Direction, RiskLevel, Sample, SeriesResolution, Thresholds, TrendEntry,
};

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolves `samples` against the reference instant `now`.
///
/// - `current` is the valid sample with the latest timestamp `<= now`. When
///   several share that timestamp the first one encountered wins. No such
///   sample means no current value, never a default of zero.
/// - `direction` is the non-empty `external_trend` verbatim if given;
///   otherwise the current value compared with the nearest sample strictly
///   after `now`, or `Unknown` if there is none.
/// - `classification` applies `thresholds` under `mode`; `Unknown` without
///   a current value.
pub fn resolve(
    samples: &[Sample],
    now: HstDateTime,
    thresholds: &Thresholds,
    mode: CompareMode,
    external_trend: Option<&str>,
) -> SeriesResolution {
    let mut current: Option<&Sample> = None;
    let mut next: Option<&Sample> = None;

    for sample in samples.iter().filter(|s| s.is_valid()) {
        if sample.timestamp <= now {
            if current.map_or(true, |c| sample.timestamp > c.timestamp) {
                current = Some(sample);
            }
        } else if next.map_or(true, |n| sample.timestamp < n.timestamp) {
            next = Some(sample);
        }
    }

    let direction = match external_trend.map(str::trim).filter(|t| !t.is_empty()) {
        Some(trend) => Direction::Reported(trend.to_string()),
        None => match (current, next) {
            (Some(c), Some(n)) => direction_between(c.value, n.value),
            _ => Direction::Unknown,
        },
    };

    let classification = current
        .map(|c| classify(c.value, thresholds, mode))
        .unwrap_or(RiskLevel::Unknown);

    SeriesResolution {
        current: current.cloned(),
        direction,
        classification,
    }
}

fn direction_between(current: f64, next: f64) -> Direction {
    if next > current {
        Direction::Rising
    } else if next < current {
        Direction::Falling
    } else {
        Direction::Stable
    }
}

/// Classifies `value` against two ascending thresholds.
///
/// The first threshold the value does not exceed decides the level;
/// exceeding both yields `High`.
pub fn classify(value: f64, thresholds: &Thresholds, mode: CompareMode) -> RiskLevel {
    let within = |limit: f64| match mode {
        CompareMode::Strict => value < limit,
        CompareMode::Inclusive => value <= limit,
    };

    if within(thresholds.low) {
        RiskLevel::Low
    } else if within(thresholds.high) {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

// ---------------------------------------------------------------------------
// Trend feed lookup
// ---------------------------------------------------------------------------

/// Looks up the externally reported trend for a source.
///
/// An entry whose name equals `key` (ignoring case) is preferred; otherwise
/// the first entry whose name contains `key` wins. Substring keys are
/// ambiguous when two gauges share a fragment, so exact names should be
/// configured wherever the feed allows it.
pub fn find_trend<'a>(feed: &'a [TrendEntry], key: &str) -> Option<&'a str> {
    let key = key.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }

    feed.iter()
        .find(|e| e.name.trim().to_lowercase() == key)
        .or_else(|| feed.iter().find(|e| e.name.to_lowercase().contains(&key)))
        .map(|e| e.trend.as_str())
}

// ---------------------------------------------------------------------------
// Chart support
// ---------------------------------------------------------------------------

/// Linearly interpolated value at `at`, used to place the "now" marker on a
/// line chart.
///
/// Returns the sample value on an exact timestamp hit and `None` when `at`
/// lies outside the sampled range.
pub fn interpolate_at(samples: &[Sample], at: HstDateTime) -> Option<f64> {
    let mut before: Option<&Sample> = None;
    let mut after: Option<&Sample> = None;

    for sample in samples.iter().filter(|s| s.is_valid()) {
        if sample.timestamp == at {
            return Some(sample.value);
        }
        if sample.timestamp < at {
            if before.map_or(true, |b| sample.timestamp > b.timestamp) {
                before = Some(sample);
            }
        } else if after.map_or(true, |a| sample.timestamp < a.timestamp) {
            after = Some(sample);
        }
    }

    let (b, a) = (before?, after?);
    let span = (a.timestamp - b.timestamp).num_milliseconds() as f64;
    let offset = (at - b.timestamp).num_milliseconds() as f64;
    Some(b.value + (a.value - b.value) * offset / span)
}

/// Samples sorted by timestamp, ready for plotting.
pub fn chronological(samples: &[Sample]) -> Vec<Sample> {
    let mut sorted: Vec<Sample> = samples.iter().filter(|s| s.is_valid()).cloned().collect();
    sorted.sort_by_key(|s| s.timestamp);
    sorted
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

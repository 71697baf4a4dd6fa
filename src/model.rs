/// Core data types for the Waikāne monitoring service.
///
/// This module defines the shared domain model imported by all other
/// modules: samples, trend directions, risk levels, tide events, the
/// per-source derived reading and the error taxonomy.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::hst::HstDateTime;

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// A single timestamped reading. The unit (ft, in, …) is implied by the
/// source the sample came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: HstDateTime,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<FixedOffset>, value: f64) -> Self {
        Sample { timestamp, value }
    }

    /// A sample is only usable if its value is a real number.
    pub fn is_valid(&self) -> bool {
        self.value.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Change between the current reading and the next known one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Direction {
    Rising,
    Falling,
    Stable,
    Unknown,
    /// Trend text supplied by the aggregator's trend feed, kept verbatim.
    Reported(String),
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rising => write!(f, "Rising"),
            Direction::Falling => write!(f, "Falling"),
            Direction::Stable => write!(f, "Stable"),
            Direction::Unknown => write!(f, "N/A"),
            Direction::Reported(trend) => write!(f, "{}", trend),
        }
    }
}

// ---------------------------------------------------------------------------
// Risk levels and thresholds
// ---------------------------------------------------------------------------

/// Risk classification of a reading, or of the whole watershed.
///
/// `Low < Medium < High` by severity; `Unknown` means there was nothing
/// to classify and sorts below every known level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskLevel {
    Unknown,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Status badge text shown next to a gauge.
    pub fn status_label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Normal",
            RiskLevel::Medium => "Warning",
            RiskLevel::High => "Danger",
            RiskLevel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// How a value is compared against each threshold.
///
/// Stream and tide gauges use `Strict` (`value < threshold`), rain gauges
/// use `Inclusive` (`value <= threshold`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    Strict,
    Inclusive,
}

/// Two ascending thresholds splitting a measurement into three levels:
///   value below `low` → Low, below `high` → Medium, otherwise High.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

// ---------------------------------------------------------------------------
// Tide events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TideKind {
    High,
    Low,
}

impl fmt::Display for TideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TideKind::High => write!(f, "High"),
            TideKind::Low => write!(f, "Low"),
        }
    }
}

/// A predicted tide extremum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TideEvent {
    pub timestamp: HstDateTime,
    pub kind: TideKind,
    pub height_ft: f64,
}

// ---------------------------------------------------------------------------
// Trend feed
// ---------------------------------------------------------------------------

/// One row of the aggregator's stream trend feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendEntry {
    pub name: String,
    pub trend: String,
}

// ---------------------------------------------------------------------------
// Derived readings
// ---------------------------------------------------------------------------

/// Result of resolving one series against a reference instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesResolution {
    /// Latest sample at or before the reference instant, if any.
    pub current: Option<Sample>,
    pub direction: Direction,
    pub classification: RiskLevel,
}

impl SeriesResolution {
    pub fn current_value(&self) -> Option<f64> {
        self.current.as_ref().map(|s| s.value)
    }

    pub fn current_timestamp(&self) -> Option<HstDateTime> {
        self.current.as_ref().map(|s| s.timestamp)
    }
}

/// Everything the UI needs to render one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReading {
    pub source_id: String,
    pub name: String,
    pub unit: String,
    pub resolution: SeriesResolution,
    /// Next predicted high/low after the current reading (tide sources only).
    pub next_tide: Option<TideEvent>,
    /// Current reading is older than the source's freshness limit.
    pub stale: bool,
}

/// Per-source state as seen by a consumer. Loading, missing data and
/// failure are always distinct.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SourceState {
    Loading,
    Ready(SourceReading),
    NoData(String),
    Error(String),
}

impl SourceState {
    /// Classification contributed to the overall indicator.
    pub fn risk(&self) -> RiskLevel {
        match self {
            SourceState::Ready(reading) => reading.resolution.classification,
            _ => RiskLevel::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or resolving a single source.
///
/// Cloneable so one in-flight fetch can hand its outcome to every caller
/// waiting on the same key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// Transport failure or timeout.
    #[error("Network error: {0}")]
    Network(String),
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    /// The response body could not be deserialized.
    #[error("Parse error: {0}")]
    Parse(String),
    /// Well-formed response without usable samples.
    #[error("No data available: {0}")]
    NoData(String),
    /// Only samples later than now were present.
    #[error("No current data (only future samples): {0}")]
    StaleOnly(String),
}

impl SourceError {
    /// True for the "nothing to show yet" class, as opposed to a failure.
    pub fn is_no_data(&self) -> bool {
        matches!(self, SourceError::NoData(_) | SourceError::StaleOnly(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SourceError::HttpStatus(status.as_u16())
        } else if err.is_timeout() {
            SourceError::Network(format!("request timed out: {}", err))
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON deserialization failed: {}", err))
    }
}

impl From<SourceError> for SourceState {
    fn from(err: SourceError) -> Self {
        if err.is_no_data() {
            SourceState::NoData(err.to_string())
        } else {
            SourceState::Error(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_levels_order_by_severity() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::Unknown < RiskLevel::Low);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(RiskLevel::Low.status_label(), "Normal");
        assert_eq!(RiskLevel::Medium.status_label(), "Warning");
        assert_eq!(RiskLevel::High.status_label(), "Danger");
    }

    #[test]
    fn test_no_data_errors_map_to_no_data_state() {
        let state: SourceState = SourceError::StaleOnly("waikane_stream".into()).into();
        assert!(matches!(state, SourceState::NoData(_)));

        let state: SourceState = SourceError::HttpStatus(502).into();
        assert_eq!(state, SourceState::Error("HTTP error: 502".to_string()));
    }

    #[test]
    fn test_only_ready_state_contributes_risk() {
        assert_eq!(SourceState::Loading.risk(), RiskLevel::Unknown);
        assert_eq!(SourceState::Error("boom".into()).risk(), RiskLevel::Unknown);
    }

    #[test]
    fn test_reported_direction_displays_verbatim() {
        assert_eq!(Direction::Reported("Rising fast".into()).to_string(), "Rising fast");
        assert_eq!(Direction::Unknown.to_string(), "N/A");
    }
}

/// Hawaiʻi Standard Time handling.
///
/// Every instant in this crate is compared in HST, a fixed UTC−10 offset
/// with no daylight-saving transitions. The aggregator publishes wall-clock
/// strings without an offset; those are read literally as HST, never as the
/// host's local zone and never as UTC.
///
/// # Clock injection
/// Resolution functions take `now` as a parameter. `now_hst()` is the only
/// place the real clock is read, so tests stay deterministic.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// An instant carried with the HST offset attached.
pub type HstDateTime = DateTime<FixedOffset>;

const HST_OFFSET_SECS: i32 = 10 * 3600;

/// Wall-clock formats published by the aggregator and NOAA, tried in order.
/// `%.f` also matches when no fractional part is present.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

/// Offset-bearing formats that RFC 3339 parsing rejects (space separator).
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// The fixed HST offset (UTC−10).
pub fn hst() -> FixedOffset {
    FixedOffset::west_opt(HST_OFFSET_SECS).unwrap_or_else(|| unreachable!("10h is a valid offset"))
}

/// Current instant in HST: the system UTC instant shifted by −10 hours.
pub fn now_hst() -> HstDateTime {
    to_hst(Utc::now())
}

/// Re-expresses any instant in HST without changing the instant itself.
pub fn to_hst<Tz: TimeZone>(dt: DateTime<Tz>) -> HstDateTime {
    dt.with_timezone(&hst())
}

/// Attaches the HST offset to wall-clock fields.
pub fn from_wall_clock(naive: NaiveDateTime) -> HstDateTime {
    // A fixed offset has exactly one mapping for every local time.
    naive
        .and_local_timezone(hst())
        .single()
        .unwrap_or_else(|| unreachable!("fixed offsets are never ambiguous"))
}

/// Parses a timestamp string into an HST instant.
///
/// Strings without an offset are read literally as HST wall time. Strings
/// with an explicit offset (or `Z`) are converted into HST.
///
/// # Errors
/// Returns a description of the input when no known format matches.
pub fn parse_hst(raw: &str) -> Result<HstDateTime, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty timestamp".to_string());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(to_hst(dt));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(to_hst(dt));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(from_wall_clock(naive));
        }
    }

    Err(format!("unrecognized timestamp '{}'", raw))
}

/// Clock time for display, e.g. `"3:45 PM HST"`.
pub fn format_hst_clock(dt: &HstDateTime) -> String {
    to_hst(*dt).format("%-I:%M %p HST").to_string()
}

/// Date and clock time for display, e.g. `"05/01 3:45 PM HST"`.
pub fn format_hst_short(dt: &HstDateTime) -> String {
    to_hst(*dt).format("%m/%d %-I:%M %p HST").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

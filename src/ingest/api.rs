/// Backend aggregator (`/api/*`) client.
///
/// Handles URL construction, fetching and JSON parsing for the feeds the
/// aggregator republishes from USGS, NOAA and the rain gauge network:
///
///   stream series  [{ "DateTime": "...", "ft": 4.2 }]
///   tide curve     [{ "Datetime": "...", "Predicted_ft_MSL": 1.1 }]
///   tide events    [{ "Date Time": "...", "Type": "H", "Prediction_ft_MSL": 1.9 }]
///   rain readings  [{ "Name": "...", "1HrRainfall": 0.1, "6HrRainfall": 0.4, "DateTime": "..." }]
///                  or [{ "in": 0.1, "DateTime": "..." }]
///   trend feed     [{ "Name": "...", "Trend": "Rising" }]
///
/// Timestamps are HST wall-clock strings without an offset. Rows with a
/// missing value or an unparsable timestamp are dropped, never defaulted.
/// See `fixtures.rs` for annotated examples.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::hst::parse_hst;
use crate::model::{Sample, SourceError, TideEvent, TideKind, TrendEntry};

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct StreamRow {
    #[serde(rename = "DateTime")]
    date_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    ft: Option<f64>,
}

#[derive(Deserialize)]
struct TideCurveRow {
    #[serde(rename = "Datetime")]
    date_time: Option<String>,
    #[serde(rename = "Predicted_ft_MSL", default, deserialize_with = "lenient_f64")]
    predicted_ft: Option<f64>,
}

#[derive(Deserialize)]
struct TideEventRow {
    #[serde(rename = "Date Time")]
    date_time: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
    #[serde(rename = "Prediction_ft_MSL", default, deserialize_with = "lenient_f64")]
    prediction_ft: Option<f64>,
}

#[derive(Deserialize)]
struct RainRow {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "1HrRainfall", default, deserialize_with = "lenient_f64")]
    one_hour_in: Option<f64>,
    #[serde(rename = "6HrRainfall", default, deserialize_with = "lenient_f64")]
    six_hour_in: Option<f64>,
    #[serde(rename = "in", default, deserialize_with = "lenient_f64")]
    inches: Option<f64>,
    #[serde(rename = "DateTime")]
    date_time: Option<String>,
}

#[derive(Deserialize)]
struct TrendRow {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Trend")]
    trend: Option<String>,
}

/// Accepts a JSON number, a numeric string, or null. Anything else becomes
/// `None` so the row is dropped rather than failing the whole payload.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}

/// Which accumulation window a gauge-list rain feed is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RainWindow {
    #[serde(rename = "1hr")]
    OneHour,
    #[serde(rename = "6hr")]
    SixHour,
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Joins the aggregator base URL and an endpoint path with exactly one `/`.
///
/// # Example
/// ```
/// use waikane_monitor::ingest::api::build_api_url;
///
/// let url = build_api_url("https://example.org/", "/api/waikane_stream");
/// assert_eq!(url, "https://example.org/api/waikane_stream");
/// ```
pub fn build_api_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// GETs `url` and returns the body text.
///
/// # Errors
/// - `SourceError::Network` — transport failure or timeout.
/// - `SourceError::HttpStatus` — non-2xx response.
pub fn fetch_body(client: &reqwest::blocking::Client, url: &str) -> Result<String, SourceError> {
    debug!(url, "fetching");

    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()?;

    if !response.status().is_success() {
        return Err(SourceError::HttpStatus(response.status().as_u16()));
    }

    Ok(response.text()?)
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn parse_rows<T: for<'de> Deserialize<'de>>(json: &str) -> Result<Vec<T>, SourceError> {
    let rows: Vec<T> = serde_json::from_str(json)?;
    if rows.is_empty() {
        return Err(SourceError::NoData("Empty response array".to_string()));
    }
    Ok(rows)
}

fn to_sample(date_time: Option<&str>, value: Option<f64>) -> Option<Sample> {
    let timestamp = parse_hst(date_time?).ok()?;
    Some(Sample::new(timestamp, value?))
}

fn require_some<T>(items: Vec<T>, total: usize, what: &str) -> Result<Vec<T>, SourceError> {
    let dropped = total - items.len();
    if dropped > 0 {
        debug!(dropped, total, "dropped invalid {} rows", what);
    }
    if items.is_empty() {
        return Err(SourceError::NoData(format!(
            "All {} {} rows were missing a value or timestamp",
            total, what
        )));
    }
    Ok(items)
}

/// Parses a stream height series (`DateTime`, `ft`).
///
/// # Errors
/// - `SourceError::Parse` — not a JSON array of objects.
/// - `SourceError::NoData` — empty array, or no row had both fields.
pub fn parse_stream_series(json: &str) -> Result<Vec<Sample>, SourceError> {
    let rows: Vec<StreamRow> = parse_rows(json)?;
    let total = rows.len();
    let samples = rows
        .into_iter()
        .filter_map(|r| to_sample(r.date_time.as_deref(), r.ft))
        .collect();
    require_some(samples, total, "stream")
}

/// Parses a predicted tide curve (`Datetime`, `Predicted_ft_MSL`).
pub fn parse_tide_curve(json: &str) -> Result<Vec<Sample>, SourceError> {
    let rows: Vec<TideCurveRow> = parse_rows(json)?;
    let total = rows.len();
    let samples = rows
        .into_iter()
        .filter_map(|r| to_sample(r.date_time.as_deref(), r.predicted_ft))
        .collect();
    require_some(samples, total, "tide curve")
}

fn parse_tide_kind(raw: &str) -> Option<TideKind> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "H" | "HH" | "HIGH" => Some(TideKind::High),
        "L" | "LL" | "LOW" => Some(TideKind::Low),
        _ => None,
    }
}

/// Parses predicted high/low tide events (`Date Time`, `Type`,
/// `Prediction_ft_MSL`).
pub fn parse_tide_events(json: &str) -> Result<Vec<TideEvent>, SourceError> {
    let rows: Vec<TideEventRow> = parse_rows(json)?;
    let total = rows.len();
    let events = rows
        .into_iter()
        .filter_map(|r| {
            Some(TideEvent {
                timestamp: parse_hst(r.date_time.as_deref()?).ok()?,
                kind: parse_tide_kind(r.kind.as_deref()?)?,
                height_ft: r.prediction_ft?,
            })
        })
        .collect();
    require_some(events, total, "tide event")
}

/// Parses rain readings in either published shape.
///
/// Gauge-list rows (`Name`, `1HrRainfall`, `6HrRainfall`) are kept only
/// when `gauge` is a case-insensitive substring of `Name`, and read from
/// the `window` field. Single-gauge rows (`in`) are always kept; an
/// unnamed gauge-list row belongs to no gauge.
pub fn parse_rain_readings(
    json: &str,
    gauge: Option<&str>,
    window: RainWindow,
) -> Result<Vec<Sample>, SourceError> {
    let rows: Vec<RainRow> = parse_rows(json)?;
    let needle = gauge.map(str::to_lowercase);

    let matching: Vec<RainRow> = rows
        .into_iter()
        .filter(|r| match (&needle, &r.name) {
            (Some(needle), Some(name)) => name.to_lowercase().contains(needle.as_str()),
            (Some(_), None) => r.inches.is_some(),
            (None, _) => true,
        })
        .collect();
    let total = matching.len();

    let samples = matching
        .into_iter()
        .filter_map(|r| {
            let value = r.inches.or(match window {
                RainWindow::OneHour => r.one_hour_in,
                RainWindow::SixHour => r.six_hour_in,
            });
            to_sample(r.date_time.as_deref(), value)
        })
        .collect();

    if total == 0 {
        return Err(SourceError::NoData(format!(
            "No rain gauge matching '{}'",
            gauge.unwrap_or_default()
        )));
    }
    require_some(samples, total, "rain")
}

/// Parses the stream trend feed (`Name`, `Trend`). Rows missing either
/// field are dropped; an empty feed is not an error.
pub fn parse_trend_feed(json: &str) -> Result<Vec<TrendEntry>, SourceError> {
    let rows: Vec<TrendRow> = serde_json::from_str(json)?;
    Ok(rows
        .into_iter()
        .filter_map(|r| {
            Some(TrendEntry {
                name: r.name?,
                trend: r.trend?,
            })
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

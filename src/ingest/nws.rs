/// National Weather Service active alerts client.
///
/// Retrieves watches, warnings and advisories for a forecast zone from the
/// NWS API (GeoJSON):
///   https://api.weather.gov/alerts/active?zone=HIZ006
///
/// The NWS API rejects requests without a `User-Agent`; the shared HTTP
/// client built in `monitor` sets one.

use serde::{Deserialize, Serialize};

use crate::hst::{parse_hst, HstDateTime};
use crate::model::SourceError;

/// Production alerts endpoint; overridable through `ServiceConfig`.
pub const NWS_ALERTS_URL: &str = "https://api.weather.gov/alerts/active";

// ============================================================================
// NWS API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct AlertCollection {
    features: Vec<AlertFeature>,
}

#[derive(Debug, Deserialize)]
struct AlertFeature {
    properties: AlertProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertProperties {
    event: Option<String>,
    headline: Option<String>,
    severity: Option<String>,
    area_desc: Option<String>,
    effective: Option<String>,
    expires: Option<String>,
}

/// One active alert, ready for the alert list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherAlert {
    pub event: String,
    pub headline: Option<String>,
    pub severity: String,
    pub area: Option<String>,
    pub effective: Option<HstDateTime>,
    pub expires: Option<HstDateTime>,
}

impl WeatherAlert {
    /// An alert without an expiry stays in effect until withdrawn.
    pub fn is_active_at(&self, now: HstDateTime) -> bool {
        self.expires.map_or(true, |expires| expires > now)
    }
}

// ============================================================================
// API Client Functions
// ============================================================================

/// Builds the active-alerts URL for an NWS forecast zone (e.g. "HIZ006").
pub fn build_alerts_url(base: &str, zone: &str) -> String {
    format!("{}?zone={}", base.trim_end_matches('/'), urlencoding::encode(zone.trim()))
}

/// Parses an NWS alerts GeoJSON collection. Features without an event name
/// are dropped. No features is a normal, quiet day, not an error.
pub fn parse_alerts(json: &str) -> Result<Vec<WeatherAlert>, SourceError> {
    let collection: AlertCollection = serde_json::from_str(json)?;

    Ok(collection
        .features
        .into_iter()
        .filter_map(|feature| {
            let p = feature.properties;
            Some(WeatherAlert {
                event: p.event?,
                headline: p.headline,
                severity: p.severity.unwrap_or_else(|| "Unknown".to_string()),
                area: p.area_desc,
                effective: p.effective.as_deref().and_then(|s| parse_hst(s).ok()),
                expires: p.expires.as_deref().and_then(|s| parse_hst(s).ok()),
            })
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

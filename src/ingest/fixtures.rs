/// Test fixtures: representative JSON payloads from the aggregator and NWS.
///
/// These fixtures are truncated to the minimum needed to exercise the
/// parsers. Aggregator timestamps are HST wall-clock strings without an
/// offset; every array may contain rows with nulls or garbage that the
/// parsers must drop rather than default.

/// Waikāne stream height around 10 AM, rising through the 7 ft warning
/// threshold. Contains one null reading and one unparsable timestamp.
#[cfg(test)]
pub(crate) fn fixture_stream_json() -> &'static str {
    r#"[
      { "DateTime": "2024-05-01 09:45:00", "ft": 6.8 },
      { "DateTime": "2024-05-01 10:00:00", "ft": 7.1 },
      { "DateTime": "2024-05-01 10:15:00", "ft": 7.42 },
      { "DateTime": "2024-05-01 10:30:00", "ft": 7.9 },
      { "DateTime": "2024-05-01 10:45:00", "ft": null },
      { "DateTime": "sensor offline", "ft": 11.0 }
    ]"#
}

/// Predicted tide curve for Kāneʻohe Bay, feet above MSL.
#[cfg(test)]
pub(crate) fn fixture_tide_curve_json() -> &'static str {
    r#"[
      { "Datetime": "2024-05-01 09:00", "Predicted_ft_MSL": 1.62 },
      { "Datetime": "2024-05-01 09:30", "Predicted_ft_MSL": 1.48 },
      { "Datetime": "2024-05-01 10:00", "Predicted_ft_MSL": 1.35 },
      { "Datetime": "2024-05-01 10:30", "Predicted_ft_MSL": 1.17 },
      { "Datetime": "2024-05-01 11:00", "Predicted_ft_MSL": null }
    ]"#
}

/// Predicted highs and lows. The last row has an unknown `Type`.
#[cfg(test)]
pub(crate) fn fixture_tide_events_json() -> &'static str {
    r#"[
      { "Date Time": "2024-05-01 08:00", "Type": "H", "Prediction_ft_MSL": 1.92 },
      { "Date Time": "2024-05-01 14:20", "Type": "L", "Prediction_ft_MSL": -0.12 },
      { "Date Time": "2024-05-01 20:40", "Type": "H", "Prediction_ft_MSL": 1.51 },
      { "Date Time": "2024-05-02 02:55", "Type": "?", "Prediction_ft_MSL": 0.40 }
    ]"#
}

/// Gauge-list rain feed: several gauges in one array, keyed by `Name`.
#[cfg(test)]
pub(crate) fn fixture_rain_gauges_json() -> &'static str {
    r#"[
      { "Name": "Waikane Makai", "1HrRainfall": 0.20, "6HrRainfall": 0.50, "DateTime": "2024-05-01 10:00:00" },
      { "Name": "Waikane Makai", "1HrRainfall": 0.35, "6HrRainfall": 0.70, "DateTime": "2024-05-01 10:15:00" },
      { "Name": "Waikane Mauka", "1HrRainfall": 1.12, "6HrRainfall": 2.80, "DateTime": "2024-05-01 10:15:00" },
      { "Name": "Kaneohe", "1HrRainfall": 0.05, "6HrRainfall": 0.10, "DateTime": "2024-05-01 10:15:00" }
    ]"#
}

/// Single-gauge rain feed: inches per interval, no gauge name.
#[cfg(test)]
pub(crate) fn fixture_rain_inches_json() -> &'static str {
    r#"[
      { "in": 0.0, "DateTime": "2024-05-01 09:00:00" },
      { "in": 0.12, "DateTime": "2024-05-01 10:00:00" },
      { "in": 0.3, "DateTime": "2024-05-01 11:00:00" }
    ]"#
}

/// Trend feed for the stream gauges. One row is missing its name.
#[cfg(test)]
pub(crate) fn fixture_trend_feed_json() -> &'static str {
    r#"[
      { "Name": "Waikane Stream", "Trend": "Rising" },
      { "Name": "Waiahole Stream", "Trend": "Falling" },
      { "Name": "Punaluu Stream", "Trend": "Steady" },
      { "Name": null, "Trend": "Rising" }
    ]"#
}

/// NWS active alerts for the windward Oʻahu zone. The third feature has
/// no event name and must be dropped.
#[cfg(test)]
pub(crate) fn fixture_nws_alerts_json() -> &'static str {
    r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "id": "urn:oid:2.49.0.1.840.0.flood",
          "properties": {
            "event": "Flood Watch",
            "headline": "Flood Watch issued May 1 at 5:47AM HST until May 2 at 6:00AM HST",
            "severity": "Severe",
            "areaDesc": "Olomana; Windward Oahu",
            "effective": "2024-05-01T06:00:00-10:00",
            "expires": "2024-05-02T06:00:00-10:00"
          }
        },
        {
          "id": "urn:oid:2.49.0.1.840.0.wind",
          "properties": {
            "event": "Wind Advisory",
            "headline": null,
            "severity": "Moderate",
            "areaDesc": "Windward Oahu",
            "effective": "2024-05-01T08:00:00-10:00",
            "expires": null
          }
        },
        {
          "id": "urn:oid:2.49.0.1.840.0.blank",
          "properties": { "event": null, "severity": "Minor" }
        }
      ]
    }"#
}

/// Structurally valid but empty aggregator response.
#[cfg(test)]
pub(crate) fn fixture_empty_array_json() -> &'static str {
    "[]"
}

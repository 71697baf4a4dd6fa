/// HTTP endpoint serving derived readings to the UI as JSON.
///
/// Endpoints:
/// - GET /health        - Service health check
/// - GET /indicator     - Overall risk plus every source's state
/// - GET /source/{id}   - One source's state
/// - GET /alerts        - Active NWS alerts for the configured zone
///
/// The endpoint only reads the monitor's current state; refreshing is the
/// scheduler's job.

use std::io::Cursor;

use serde_json::{json, Value};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{info, warn};

use crate::monitor::Monitor;

const ENDPOINTS: [&str; 4] = ["/health", "/indicator", "/source/{id}", "/alerts"];

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Maps a request to a status code and JSON body.
pub fn route(monitor: &Monitor, method: &Method, url: &str) -> (u16, Value) {
    if *method != Method::Get {
        return (405, json!({ "error": "Method not allowed", "allowed": ["GET"] }));
    }

    // Query strings are accepted and ignored.
    let path = url.split('?').next().unwrap_or_default().trim_end_matches('/');

    match path {
        "/health" => handle_health(monitor),
        "/indicator" => handle_indicator(monitor),
        "/alerts" => handle_alerts(monitor),
        _ => match path.strip_prefix("/source/") {
            Some(id) if !id.is_empty() => handle_source(monitor, id),
            _ => (
                404,
                json!({ "error": "Not found", "available_endpoints": ENDPOINTS }),
            ),
        },
    }
}

fn handle_health(monitor: &Monitor) -> (u16, Value) {
    (
        200,
        json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "sources": monitor.registry().sources.len(),
        }),
    )
}

fn handle_indicator(monitor: &Monitor) -> (u16, Value) {
    to_json_response(&monitor.indicator())
}

fn handle_source(monitor: &Monitor, id: &str) -> (u16, Value) {
    let panel = monitor.indicator();
    match panel.sources.iter().find(|s| s.id == id) {
        Some(status) => to_json_response(status),
        None => (404, json!({ "error": "Unknown source", "source_id": id })),
    }
}

fn handle_alerts(monitor: &Monitor) -> (u16, Value) {
    let alerts = monitor.alerts();
    (
        200,
        json!({
            "zone": monitor.config().nws_zone,
            "count": alerts.len(),
            "alerts": alerts,
        }),
    )
}

fn to_json_response<T: serde::Serialize>(data: &T) -> (u16, Value) {
    match serde_json::to_value(data) {
        Ok(value) => (200, value),
        Err(e) => (500, json!({ "error": format!("Serialization failed: {}", e) })),
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Binds `0.0.0.0:{port}` and serves requests until the process exits.
pub fn start_endpoint_server(port: u16, monitor: Monitor) -> Result<(), String> {
    let server = Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    info!(port, endpoints = ?ENDPOINTS, "HTTP endpoint listening");
    serve(&server, &monitor);
    Ok(())
}

/// Answers requests from an already-bound server.
pub fn serve(server: &Server, monitor: &Monitor) {
    for request in server.incoming_requests() {
        let (status, body) = route(monitor, request.method(), request.url());
        if let Err(e) = request.respond(create_response(status, &body)) {
            warn!(error = %e, "failed to send response");
        }
    }
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: &Value) -> Response<Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(json).unwrap_or_else(|_| "{}".to_string());
    let response = Response::from_data(body.into_bytes()).with_status_code(StatusCode(status_code));

    match Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_sources, ServiceConfig};
    use crate::hst::hst;
    use crate::ingest::fixtures::{fixture_stream_json, fixture_trend_feed_json};
    use crate::model::SourceError;
    use crate::monitor::Transport;
    use chrono::TimeZone;
    use std::sync::Arc;

    /// Serves the Waikāne stream and trend feed; everything else is down.
    struct StreamOnly;

    impl Transport for StreamOnly {
        fn get(&self, url: &str) -> Result<String, SourceError> {
            if url.ends_with("/api/waikane_stream") {
                Ok(fixture_stream_json().to_string())
            } else if url.ends_with("/api/stream_trends") {
                Ok(fixture_trend_feed_json().to_string())
            } else {
                Err(SourceError::Network("connection refused".to_string()))
            }
        }
    }

    fn test_monitor() -> Monitor {
        let registry = load_sources(concat!(env!("CARGO_MANIFEST_DIR"), "/sources.toml"))
            .expect("shipped sources.toml loads");
        Monitor::with_transport(ServiceConfig::default(), registry, Arc::new(StreamOnly))
    }

    fn get(monitor: &Monitor, url: &str) -> (u16, Value) {
        route(monitor, &Method::Get, url)
    }

    #[test]
    fn test_health_reports_service_and_source_count() {
        let (status, body) = get(&test_monitor(), "/health");
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "waikane_monitor");
        assert_eq!(body["sources"], 6);
    }

    #[test]
    fn test_indicator_before_refresh_is_unknown_and_loading() {
        let (status, body) = get(&test_monitor(), "/indicator");
        assert_eq!(status, 200);
        assert_eq!(body["overall"], "Unknown");
        assert_eq!(body["sources"][0]["state"], "loading");
    }

    #[test]
    fn test_source_route_after_refresh() {
        let monitor = test_monitor();
        let now = hst().with_ymd_and_hms(2024, 5, 1, 10, 20, 0).unwrap();
        monitor.refresh_source_at("waikane_stream", now);
        monitor.refresh_source_at("waiahole_stream", now);

        let (status, body) = get(&monitor, "/source/waikane_stream");
        assert_eq!(status, 200);
        assert_eq!(body["id"], "waikane_stream");
        assert_eq!(body["state"], "ready");
        assert_eq!(body["detail"]["resolution"]["classification"], "Medium");
        assert_eq!(body["detail"]["resolution"]["current"]["value"], 7.42);

        let (_, failed) = get(&monitor, "/source/waiahole_stream?verbose=1");
        assert_eq!(failed["state"], "error");
        assert!(failed["detail"].as_str().unwrap_or_default().contains("connection refused"));
    }

    #[test]
    fn test_unknown_source_is_404() {
        let (status, body) = get(&test_monitor(), "/source/kahaluu_stream");
        assert_eq!(status, 404);
        assert_eq!(body["source_id"], "kahaluu_stream");
    }

    #[test]
    fn test_alerts_empty_until_refreshed() {
        let (status, body) = get(&test_monitor(), "/alerts");
        assert_eq!(status, 200);
        assert_eq!(body["zone"], "HIZ006");
        assert_eq!(body["count"], 0);
    }

    #[test]
    fn test_unknown_path_lists_endpoints() {
        let (status, body) = get(&test_monitor(), "/site/05568500");
        assert_eq!(status, 404);
        assert_eq!(body["available_endpoints"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn test_non_get_rejected() {
        let (status, _) = route(&test_monitor(), &Method::Post, "/indicator");
        assert_eq!(status, 405);
    }
}

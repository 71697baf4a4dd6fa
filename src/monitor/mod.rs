/// Source monitoring: the composition root of the library.
///
/// A `Monitor` owns the transport, the TTL cache and the latest
/// `SourceState` for every configured source. A refresh fetches each source
/// through the cache, parses it according to its kind, resolves it against
/// "now" and stores the result. Sources refresh concurrently on a thread
/// pool and fail independently: a 503 from one gauge leaves the others
/// untouched.
///
/// **Flow per source:**
/// 1. Fetch `path` (cached, single-flight per URL)
/// 2. Parse by kind: stream series, tide curve or rain readings
/// 3. Stream: look up the trend feed; tide: find the next high/low
/// 4. Resolve current value, direction and classification
/// 5. Flag the reading stale if older than `max_age_minutes`
/// 6. Store `Ready`, `NoData` or `Error`
///
/// `Monitor` is a cheap handle (`Arc` inside); clone it into the scheduler
/// and endpoint threads.

pub mod transport;

use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use threadpool::ThreadPool;
use tracing::{debug, info};

use crate::alert::staleness::is_stale_at;
use crate::analysis::aggregate::aggregate;
use crate::analysis::events::find_next;
use crate::analysis::resolver::{find_trend, resolve};
use crate::cache::TtlCache;
use crate::config::ServiceConfig;
use crate::hst::{now_hst, HstDateTime};
use crate::ingest::api::{
    build_api_url, parse_rain_readings, parse_stream_series, parse_tide_curve, parse_tide_events,
    parse_trend_feed,
};
use crate::ingest::nws::{build_alerts_url, parse_alerts, WeatherAlert};
use crate::logging::{log_refresh_summary, log_source_failure, DataSource};
use crate::model::{RiskLevel, SourceError, SourceReading, SourceState, TideEvent};
use crate::sources::{SourceConfig, SourceKind, SourceRegistry};

pub use transport::{HttpTransport, Transport};

// ---------------------------------------------------------------------------
// Panel types
// ---------------------------------------------------------------------------

/// One row of the indicator panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub unit: String,
    #[serde(flatten)]
    pub state: SourceState,
}

/// Overall indicator plus every source's state, in registry order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorPanel {
    pub overall: RiskLevel,
    /// "Normal", "Warning", "Danger" or "Unknown".
    pub label: String,
    pub generated_at: HstDateTime,
    pub sources: Vec<SourceStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshSummary {
    pub total: usize,
    pub successful: usize,
    /// Sources that answered but had nothing current to report.
    pub no_data: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

struct MonitorInner {
    config: ServiceConfig,
    registry: SourceRegistry,
    transport: Arc<dyn Transport>,
    cache: TtlCache<String>,
    states: Mutex<HashMap<String, SourceState>>,
    alerts: Mutex<Vec<WeatherAlert>>,
    pool: Mutex<ThreadPool>,
}

#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    /// Builds a monitor that talks HTTP with the configured timeout.
    pub fn new(config: ServiceConfig, registry: SourceRegistry) -> Result<Self, SourceError> {
        let transport = HttpTransport::new(config.http_timeout())?;
        Ok(Self::with_transport(config, registry, Arc::new(transport)))
    }

    /// Builds a monitor over any transport. Every source starts `Loading`.
    pub fn with_transport(
        config: ServiceConfig,
        registry: SourceRegistry,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let states = registry
            .sources
            .iter()
            .map(|s| (s.id.clone(), SourceState::Loading))
            .collect();
        let cache = TtlCache::new(config.cache_ttl());
        let pool = ThreadPool::with_name("source-refresh".to_string(), config.worker_threads.max(1));

        Self {
            inner: Arc::new(MonitorInner {
                config,
                registry,
                transport,
                cache,
                states: Mutex::new(states),
                alerts: Mutex::new(Vec::new()),
                pool: Mutex::new(pool),
            }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.inner.registry
    }

    /// Latest state for `id`, or `None` for an unknown source.
    pub fn state(&self, id: &str) -> Option<SourceState> {
        lock(&self.inner.states).get(id).cloned()
    }

    // --- Refresh ------------------------------------------------------------

    /// Refreshes one source now. Returns `None` for an unknown id.
    pub fn refresh_source(&self, id: &str) -> Option<SourceState> {
        self.refresh_source_at(id, now_hst())
    }

    pub fn refresh_source_at(&self, id: &str, now: HstDateTime) -> Option<SourceState> {
        let source = self.inner.registry.find(id)?;

        let state = match self.load(source, now) {
            Ok(reading) => {
                debug!(
                    source_id = id,
                    value = ?reading.resolution.current_value(),
                    classification = %reading.resolution.classification,
                    "source refreshed"
                );
                SourceState::Ready(reading)
            }
            Err(err) => {
                log_source_failure(DataSource::Aggregator, id, "refresh", &err);
                SourceState::from(err)
            }
        };

        lock(&self.inner.states).insert(id.to_string(), state.clone());
        Some(state)
    }

    /// Refreshes every configured source concurrently.
    pub fn refresh_all(&self) -> RefreshSummary {
        let ids: Vec<String> = self.inner.registry.ids().into_iter().map(String::from).collect();
        self.refresh_ids_at(&ids, now_hst())
    }

    pub fn refresh_ids(&self, ids: &[String]) -> RefreshSummary {
        self.refresh_ids_at(ids, now_hst())
    }

    /// Refreshes `ids` on the worker pool and waits for all of them.
    pub fn refresh_ids_at(&self, ids: &[String], now: HstDateTime) -> RefreshSummary {
        let pool = lock(&self.inner.pool).clone();
        let (tx, rx) = mpsc::channel();

        for id in ids {
            let monitor = self.clone();
            let tx = tx.clone();
            let id = id.clone();
            pool.execute(move || {
                let state = monitor.refresh_source_at(&id, now);
                let _ = tx.send(state);
            });
        }
        drop(tx);

        // A job that panics drops its sender without reporting; it counts as failed.
        let (mut successful, mut no_data) = (0, 0);
        for state in rx.iter() {
            match state {
                Some(SourceState::Ready(_)) => successful += 1,
                Some(SourceState::NoData(_)) => no_data += 1,
                _ => {}
            }
        }

        let summary = RefreshSummary {
            total: ids.len(),
            successful,
            no_data,
            failed: ids.len() - successful - no_data,
        };
        log_refresh_summary(summary.total, summary.successful, summary.no_data, summary.failed);
        summary
    }

    /// Drops cached payloads so the next refresh hits the network.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drops the cached payloads behind one source.
    pub fn invalidate_source(&self, id: &str) {
        let Some(source) = self.inner.registry.find(id) else {
            return;
        };
        let base = &self.inner.config.api_base;
        self.inner.cache.invalidate(&build_api_url(base, &source.path));
        if let Some(events_path) = &source.events_path {
            self.inner.cache.invalidate(&build_api_url(base, events_path));
        }
    }

    // --- Panel --------------------------------------------------------------

    pub fn indicator(&self) -> IndicatorPanel {
        self.indicator_at(now_hst())
    }

    /// Snapshot of every source plus the aggregate risk level.
    pub fn indicator_at(&self, now: HstDateTime) -> IndicatorPanel {
        let sources: Vec<SourceStatus> = {
            let states = lock(&self.inner.states);
            self.inner
                .registry
                .sources
                .iter()
                .map(|s| SourceStatus {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    kind: s.kind,
                    unit: s.unit.clone(),
                    state: states.get(&s.id).cloned().unwrap_or(SourceState::Loading),
                })
                .collect()
        };

        let levels: Vec<RiskLevel> = sources.iter().map(|s| s.state.risk()).collect();
        let overall = aggregate(&levels);

        IndicatorPanel {
            overall,
            label: overall.status_label().to_string(),
            generated_at: now,
            sources,
        }
    }

    // --- Weather alerts -----------------------------------------------------

    pub fn refresh_alerts(&self) -> Result<Vec<WeatherAlert>, SourceError> {
        self.refresh_alerts_at(now_hst())
    }

    /// Fetches NWS alerts for the configured zone and keeps the active ones.
    pub fn refresh_alerts_at(&self, now: HstDateTime) -> Result<Vec<WeatherAlert>, SourceError> {
        let config = &self.inner.config;
        let url = build_alerts_url(&config.nws_alerts_url, &config.nws_zone);

        let alerts = self
            .fetch_url(&url, now)
            .and_then(|body| parse_alerts(&body))
            .map_err(|err| {
                log_source_failure(DataSource::Nws, &config.nws_zone, "alerts", &err);
                err
            })?;

        let active: Vec<WeatherAlert> =
            alerts.into_iter().filter(|a| a.is_active_at(now)).collect();
        if !active.is_empty() {
            info!(zone = %config.nws_zone, count = active.len(), "active weather alerts");
        }
        *lock(&self.inner.alerts) = active.clone();
        Ok(active)
    }

    /// Alerts from the last successful alerts refresh.
    pub fn alerts(&self) -> Vec<WeatherAlert> {
        lock(&self.inner.alerts).clone()
    }

    // --- Internals ----------------------------------------------------------

    fn fetch_url(&self, url: &str, now: HstDateTime) -> Result<String, SourceError> {
        let transport = &self.inner.transport;
        self.inner
            .cache
            .get_or_fetch_at(url, now.with_timezone(&Utc), || transport.get(url))
    }

    fn fetch_path(&self, path: &str, now: HstDateTime) -> Result<String, SourceError> {
        self.fetch_url(&build_api_url(&self.inner.config.api_base, path), now)
    }

    fn load(&self, source: &SourceConfig, now: HstDateTime) -> Result<SourceReading, SourceError> {
        let body = self.fetch_path(&source.path, now)?;

        let (samples, trend) = match source.kind {
            SourceKind::Stream => (parse_stream_series(&body)?, self.trend_for(source, now)),
            SourceKind::Tide => (parse_tide_curve(&body)?, None),
            SourceKind::Rain => (
                parse_rain_readings(&body, source.gauge.as_deref(), source.window)?,
                None,
            ),
        };

        let resolution = resolve(
            &samples,
            now,
            &source.thresholds(),
            source.compare_mode,
            trend.as_deref(),
        );

        let Some(timestamp) = resolution.current_timestamp() else {
            return Err(SourceError::StaleOnly(format!(
                "all {} samples are later than {}",
                samples.len(),
                now.format("%Y-%m-%d %H:%M")
            )));
        };
        let stale = source
            .max_age_minutes
            .is_some_and(|max_age| is_stale_at(&timestamp, max_age, now));
        let next_tide = match source.kind {
            SourceKind::Tide => self.next_tide_for(source, timestamp, now),
            _ => None,
        };

        Ok(SourceReading {
            source_id: source.id.clone(),
            name: source.name.clone(),
            unit: source.unit.clone(),
            resolution,
            next_tide,
            stale,
        })
    }

    /// Reported trend for a stream gauge. A missing or broken trend feed
    /// only loses the override; the computed direction still stands.
    fn trend_for(&self, source: &SourceConfig, now: HstDateTime) -> Option<String> {
        let key = source.trend_key.as_deref()?;
        let path = self.inner.registry.trend_feed_path.as_deref()?;

        match self.fetch_path(path, now).and_then(|body| parse_trend_feed(&body)) {
            Ok(feed) => find_trend(&feed, key).map(str::to_string),
            Err(err) => {
                log_source_failure(DataSource::Aggregator, &source.id, "trend feed", &err);
                None
            }
        }
    }

    /// First predicted extremum after the latest curve sample, which may lag
    /// `now` when the curve feed is behind.
    fn next_tide_for(
        &self,
        source: &SourceConfig,
        after: HstDateTime,
        now: HstDateTime,
    ) -> Option<TideEvent> {
        let path = source.events_path.as_deref()?;

        match self.fetch_path(path, now).and_then(|body| parse_tide_events(&body)) {
            Ok(events) => find_next(&events, after),
            Err(err) => {
                log_source_failure(DataSource::Aggregator, &source.id, "tide events", &err);
                None
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hst::hst;
    use crate::ingest::fixtures::*;
    use crate::ingest::nws::NWS_ALERTS_URL;
    use crate::model::{Direction, TideKind};
    use chrono::TimeZone;

    const BASE: &str = "http://stub";

    /// Serves canned bodies by URL and records every request.
    struct StubTransport {
        routes: HashMap<String, Result<String, SourceError>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubTransport {
        fn new() -> Self {
            Self {
                routes: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn route(mut self, path: &str, body: Result<&str, SourceError>) -> Self {
            let url = if path.starts_with("http") {
                path.to_string()
            } else {
                build_api_url(BASE, path)
            };
            self.routes.insert(url, body.map(str::to_string));
            self
        }

        fn calls_to(&self, path: &str) -> usize {
            let url = build_api_url(BASE, path);
            lock(&self.calls).iter().filter(|c| **c == url).count()
        }
    }

    impl Transport for StubTransport {
        fn get(&self, url: &str) -> Result<String, SourceError> {
            lock(&self.calls).push(url.to_string());
            self.routes
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(SourceError::Network(format!("no route for {}", url))))
        }
    }

    fn shipped_registry() -> SourceRegistry {
        crate::config::load_sources(concat!(env!("CARGO_MANIFEST_DIR"), "/sources.toml"))
            .expect("shipped sources.toml loads")
    }

    fn stub_config() -> ServiceConfig {
        ServiceConfig {
            api_base: BASE.to_string(),
            ..ServiceConfig::default()
        }
    }

    fn healthy_stub() -> StubTransport {
        StubTransport::new()
            .route("/api/waikane_stream", Ok(fixture_stream_json()))
            .route("/api/waiahole_stream", Err(SourceError::HttpStatus(503)))
            .route("/api/punaluu_stream", Ok(fixture_empty_array_json()))
            .route("/api/waikane_tide_curve", Ok(fixture_tide_curve_json()))
            .route("/api/waikane_tides", Ok(fixture_tide_events_json()))
            .route("/api/rain", Ok(fixture_rain_gauges_json()))
            .route("/api/stream_trends", Ok(fixture_trend_feed_json()))
    }

    fn monitor_with(stub: Arc<StubTransport>) -> Monitor {
        Monitor::with_transport(stub_config(), shipped_registry(), stub)
    }

    fn hst_at(day: u32, h: u32, m: u32) -> HstDateTime {
        hst().with_ymd_and_hms(2024, 5, day, h, m, 0).unwrap()
    }

    fn ready(state: Option<SourceState>) -> SourceReading {
        match state {
            Some(SourceState::Ready(reading)) => reading,
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    fn all_ids(monitor: &Monitor) -> Vec<String> {
        monitor.registry().ids().into_iter().map(String::from).collect()
    }

    // --- Initial state ------------------------------------------------------

    #[test]
    fn test_sources_start_loading_and_indicator_unknown() {
        let monitor = monitor_with(Arc::new(StubTransport::new()));
        assert_eq!(monitor.state("waikane_stream"), Some(SourceState::Loading));
        assert_eq!(monitor.state("no_such_source"), None);

        let panel = monitor.indicator_at(hst_at(1, 10, 20));
        assert_eq!(panel.overall, RiskLevel::Unknown);
        assert_eq!(panel.label, "Unknown");
        assert_eq!(panel.sources.len(), 6);
    }

    // --- Per-source resolution ----------------------------------------------

    #[test]
    fn test_stream_uses_reported_trend_and_strict_thresholds() {
        let monitor = monitor_with(Arc::new(healthy_stub()));
        let reading = ready(monitor.refresh_source_at("waikane_stream", hst_at(1, 10, 20)));

        assert_eq!(reading.resolution.current_value(), Some(7.42));
        assert_eq!(reading.resolution.direction, Direction::Reported("Rising".to_string()));
        assert_eq!(reading.resolution.classification, RiskLevel::Medium);
        assert!(!reading.stale, "5-minute-old reading is fresh");
        assert_eq!(reading.next_tide, None);
    }

    #[test]
    fn test_stream_without_trend_feed_computes_direction() {
        let stub = StubTransport::new().route("/api/waikane_stream", Ok(fixture_stream_json()));
        let monitor = monitor_with(Arc::new(stub));
        let reading = ready(monitor.refresh_source_at("waikane_stream", hst_at(1, 10, 20)));
        assert_eq!(reading.resolution.direction, Direction::Rising, "7.42 -> 7.9");
    }

    #[test]
    fn test_tide_reports_next_event() {
        let monitor = monitor_with(Arc::new(healthy_stub()));
        let reading = ready(monitor.refresh_source_at("waikane_tide", hst_at(1, 10, 20)));

        assert_eq!(reading.resolution.current_value(), Some(1.35));
        assert_eq!(reading.resolution.direction, Direction::Falling);
        assert_eq!(reading.resolution.classification, RiskLevel::Low);

        let next = reading.next_tide.expect("a low is predicted at 14:20");
        assert_eq!(next.kind, TideKind::Low);
        assert_eq!(next.timestamp, hst_at(1, 14, 20));
    }

    #[test]
    fn test_next_tide_counted_from_latest_sample_not_refresh_time() {
        let stub = StubTransport::new()
            .route(
                "/api/waikane_tide_curve",
                Ok(r#"[{ "Datetime": "2024-05-01 10:00:00", "Predicted_ft_MSL": 1.2 }]"#),
            )
            .route(
                "/api/waikane_tides",
                Ok(r#"[
                  { "Date Time": "2024-05-01 10:10", "Type": "L", "Prediction_ft_MSL": 1.1 },
                  { "Date Time": "2024-05-01 16:00", "Type": "H", "Prediction_ft_MSL": 2.0 }
                ]"#),
            );
        let monitor = monitor_with(Arc::new(stub));
        let reading = ready(monitor.refresh_source_at("waikane_tide", hst_at(1, 10, 20)));

        assert_eq!(reading.resolution.current_timestamp(), Some(hst_at(1, 10, 0)));
        let next = reading.next_tide.expect("the 10:10 low follows the 10:00 sample");
        assert_eq!(next.kind, TideKind::Low);
        assert_eq!(next.timestamp, hst_at(1, 10, 10), "low between sample and refresh is kept");
    }

    #[test]
    fn test_rain_gauges_share_one_fetch() {
        let stub = Arc::new(healthy_stub());
        let monitor = monitor_with(Arc::clone(&stub));
        let now = hst_at(1, 10, 20);

        let makai = ready(monitor.refresh_source_at("makai_rain", now));
        let mauka = ready(monitor.refresh_source_at("mauka_rain", now));

        assert_eq!(makai.resolution.current_value(), Some(0.35));
        assert_eq!(makai.resolution.classification, RiskLevel::Low);
        assert_eq!(mauka.resolution.current_value(), Some(1.12));
        assert_eq!(mauka.resolution.classification, RiskLevel::Medium);
        assert_eq!(stub.calls_to("/api/rain"), 1, "second gauge served from cache");
    }

    #[test]
    fn test_old_reading_flagged_stale() {
        let monitor = monitor_with(Arc::new(healthy_stub()));
        let reading = ready(monitor.refresh_source_at("waikane_stream", hst_at(1, 12, 0)));
        assert_eq!(reading.resolution.current_value(), Some(7.9));
        assert!(reading.stale, "90 minutes old exceeds the 60 minute limit");
    }

    #[test]
    fn test_only_future_samples_is_no_data() {
        let monitor = monitor_with(Arc::new(healthy_stub()));
        let state = monitor.refresh_source_at("waikane_stream", hst_at(1, 9, 0));
        assert!(
            matches!(state, Some(SourceState::NoData(_))),
            "expected NoData, got {:?}",
            state
        );
    }

    #[test]
    fn test_unknown_source_returns_none() {
        let monitor = monitor_with(Arc::new(healthy_stub()));
        assert_eq!(monitor.refresh_source_at("kahaluu_stream", hst_at(1, 10, 20)), None);
    }

    // --- Refresh all --------------------------------------------------------

    #[test]
    fn test_refresh_all_isolates_failures() {
        let monitor = monitor_with(Arc::new(healthy_stub()));
        let now = hst_at(1, 10, 20);
        let summary = monitor.refresh_ids_at(&all_ids(&monitor), now);

        assert_eq!(summary, RefreshSummary { total: 6, successful: 4, no_data: 1, failed: 1 });
        assert_eq!(
            monitor.state("waiahole_stream"),
            Some(SourceState::Error("HTTP error: 503".to_string()))
        );
        assert!(matches!(monitor.state("punaluu_stream"), Some(SourceState::NoData(_))));

        let panel = monitor.indicator_at(now);
        assert_eq!(panel.overall, RiskLevel::Medium, "stream and mauka rain are Medium");
        assert_eq!(panel.label, "Warning");
        let order: Vec<&str> = panel.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, monitor.registry().ids(), "panel follows registry order");
    }

    #[test]
    fn test_cache_reused_across_refreshes_until_cleared() {
        let stub = Arc::new(healthy_stub());
        let monitor = monitor_with(Arc::clone(&stub));
        let now = hst_at(1, 10, 20);

        monitor.refresh_source_at("waikane_stream", now);
        monitor.refresh_source_at("waikane_stream", now);
        assert_eq!(stub.calls_to("/api/waikane_stream"), 1);

        monitor.invalidate_source("waikane_stream");
        monitor.refresh_source_at("waikane_stream", now);
        assert_eq!(stub.calls_to("/api/waikane_stream"), 2);

        monitor.clear_cache();
        monitor.refresh_source_at("waikane_stream", now);
        assert_eq!(stub.calls_to("/api/waikane_stream"), 3);
    }

    #[test]
    fn test_failed_fetch_retried_on_next_refresh() {
        let stub = Arc::new(healthy_stub());
        let monitor = monitor_with(Arc::clone(&stub));
        let now = hst_at(1, 10, 20);

        monitor.refresh_source_at("waiahole_stream", now);
        monitor.refresh_source_at("waiahole_stream", now);
        assert_eq!(stub.calls_to("/api/waiahole_stream"), 2, "errors are not cached");
    }

    // --- Alerts -------------------------------------------------------------

    #[test]
    fn test_alerts_filtered_to_active() {
        let alerts_url = build_alerts_url(NWS_ALERTS_URL, "HIZ006");
        let stub = StubTransport::new().route(&alerts_url, Ok(fixture_nws_alerts_json()));
        let monitor = monitor_with(Arc::new(stub));

        let active = monitor.refresh_alerts_at(hst_at(1, 10, 20)).expect("alerts parse");
        assert_eq!(active.len(), 2);

        let later = monitor.refresh_alerts_at(hst_at(2, 7, 0)).expect("alerts parse");
        let events: Vec<&str> = later.iter().map(|a| a.event.as_str()).collect();
        assert_eq!(events, vec!["Wind Advisory"], "flood watch expired at 06:00");
        assert_eq!(monitor.alerts(), later);
    }

    #[test]
    fn test_alert_failure_keeps_previous_list() {
        let monitor = monitor_with(Arc::new(StubTransport::new()));
        assert!(monitor.refresh_alerts_at(hst_at(1, 10, 20)).is_err());
        assert!(monitor.alerts().is_empty());
    }
}

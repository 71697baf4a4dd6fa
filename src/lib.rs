/// waikane_monitor: Waikāne / Kāneʻohe Bay watershed risk monitoring.
///
/// # Module structure
///
/// ```text
/// waikane_monitor
/// ├── model       — shared data types (Sample, RiskLevel, SourceState, SourceError, …)
/// ├── hst         — fixed UTC−10 time handling, parsing and display
/// ├── config      — service settings (env / .env) and sources.toml loader
/// ├── sources     — source registry: endpoints, thresholds, compare modes
/// ├── cache       — keyed TTL cache with single-flight fetching
/// ├── ingest
/// │   ├── api     — backend aggregator: URL construction + JSON parsing
/// │   ├── nws     — NWS active alerts (GeoJSON)
/// │   └── fixtures (test only) — representative API response payloads
/// ├── analysis
/// │   ├── resolver  — current value, direction and risk for one series
/// │   ├── aggregate — overall risk from per-source levels
/// │   └── events    — next predicted tide high/low
/// ├── alert
/// │   └── staleness — reading freshness checking
/// ├── monitor     — refresh orchestration and the indicator panel
/// ├── scheduler   — shared periodic refresh loop with subscriptions
/// ├── endpoint    — JSON HTTP API for the UI
/// └── logging     — tracing setup and failure classification
/// ```

/// Public modules
pub mod alert;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod endpoint;
pub mod hst;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod scheduler;
pub mod sources;

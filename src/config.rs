/// Service configuration: environment settings and the source registry loader.
///
/// Environment variables (optionally from a `.env` file via `dotenv`) hold
/// deployment settings; `sources.toml` holds per-source metadata. Loading
/// never panics: a missing or malformed file comes back as `ConfigError`
/// so `main` can report it and exit cleanly.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::ingest::nws::NWS_ALERTS_URL;
use crate::sources::{SourceConfig, SourceRegistry};

pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
pub const DEFAULT_NWS_ZONE: &str = "HIZ006";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_SOURCES_PATH: &str = "sources.toml";
pub const DEFAULT_WORKER_THREADS: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse sources: {0}")]
    Parse(String),

    #[error("Invalid source registry: {0}")]
    Invalid(String),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: String, value: String },
}

// ---------------------------------------------------------------------------
// Service settings
// ---------------------------------------------------------------------------

/// Deployment settings shared by the monitor, scheduler and endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Base URL of the backend aggregator.
    pub api_base: String,
    /// NWS active-alerts endpoint.
    pub nws_alerts_url: String,
    /// NWS forecast zone used for the active alerts query.
    pub nws_zone: String,
    pub http_timeout_secs: u64,
    /// How often the scheduler refreshes subscribed sources.
    pub refresh_interval_secs: u64,
    /// How long a fetched payload is reused before refetching.
    pub cache_ttl_secs: u64,
    pub sources_path: String,
    /// Size of the pool used to refresh sources concurrently.
    pub worker_threads: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            nws_alerts_url: NWS_ALERTS_URL.to_string(),
            nws_zone: DEFAULT_NWS_ZONE.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            sources_path: DEFAULT_SOURCES_PATH.to_string(),
            worker_threads: DEFAULT_WORKER_THREADS,
        }
    }
}

impl ServiceConfig {
    /// Reads settings from the process environment, loading `.env` first.
    ///
    /// Unset variables keep their defaults; set-but-unparsable numbers are
    /// an error rather than silently falling back.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup("WAIKANE_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("NWS_ALERTS_URL") {
            config.nws_alerts_url = url;
        }
        if let Some(zone) = lookup("NWS_ALERT_ZONE") {
            config.nws_zone = zone;
        }
        if let Some(path) = lookup("SOURCES_PATH") {
            config.sources_path = path;
        }
        config.http_timeout_secs =
            parse_var(&lookup, "HTTP_TIMEOUT_SECS", config.http_timeout_secs)?;
        config.refresh_interval_secs =
            parse_var(&lookup, "REFRESH_INTERVAL_SECS", config.refresh_interval_secs)?;
        config.cache_ttl_secs = parse_var(&lookup, "CACHE_TTL_SECS", config.cache_ttl_secs)?;
        config.worker_threads = parse_var(&lookup, "WORKER_THREADS", config.worker_threads)?;

        if config.worker_threads == 0 {
            return Err(ConfigError::Env {
                var: "WORKER_THREADS".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Env {
            var: var.to_string(),
            value: raw,
        }),
    }
}

// ---------------------------------------------------------------------------
// Source registry loading
// ---------------------------------------------------------------------------

/// Loads and validates the source registry from a TOML file.
pub fn load_sources(path: impl AsRef<Path>) -> Result<SourceRegistry, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    SourceRegistry::from_toml(&contents)
}

/// Loads the registry and builds a lookup map keyed by source id.
pub fn load_sources_map(
    path: impl AsRef<Path>,
) -> Result<HashMap<String, SourceConfig>, ConfigError> {
    Ok(load_sources(path)?
        .sources
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect())
}

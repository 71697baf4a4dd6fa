/// Source registry for the Waikāne monitoring service.
///
/// Separates per-source metadata (endpoint, thresholds, compare mode, trend
/// key) from code, so thresholds can be tuned or a gauge added by editing
/// `sources.toml` without recompiling. This is the single source of truth
/// for source ids; other modules look sources up here rather than
/// hardcoding them.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::ingest::api::RainWindow;
use crate::model::{CompareMode, Thresholds};

/// What kind of series a source publishes, which decides how it is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Stream,
    Tide,
    Rain,
}

/// One monitored source, as loaded from `sources.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: SourceKind,
    pub unit: String,

    /// Aggregator endpoint for the series, relative to the API base URL.
    pub path: String,
    /// Aggregator endpoint for predicted highs/lows (tide sources only).
    #[serde(default)]
    pub events_path: Option<String>,

    pub compare_mode: CompareMode,
    pub thresholds: ThresholdConfig,

    /// Case-insensitive key into the trend feed (stream sources only).
    #[serde(default)]
    pub trend_key: Option<String>,

    /// Gauge name filter for gauge-list rain feeds.
    #[serde(default)]
    pub gauge: Option<String>,
    #[serde(default = "default_rain_window")]
    pub window: RainWindow,

    /// A current reading older than this is flagged stale.
    #[serde(default)]
    pub max_age_minutes: Option<u64>,
}

fn default_rain_window() -> RainWindow {
    RainWindow::OneHour
}

/// Two ascending thresholds for a source.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    pub low: f64,
    pub high: f64,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<&ThresholdConfig> for Thresholds {
    fn from(config: &ThresholdConfig) -> Self {
        Thresholds {
            low: config.low,
            high: config.high,
        }
    }
}

impl SourceConfig {
    pub fn thresholds(&self) -> Thresholds {
        (&self.thresholds).into()
    }
}

/// Root of `sources.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    /// Aggregator endpoint for the stream trend feed.
    #[serde(default)]
    pub trend_feed_path: Option<String>,
    #[serde(rename = "source")]
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    /// Parses and validates a registry from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let registry: SourceRegistry =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    /// Rejects registries that would classify incorrectly or collide on id.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("no sources configured".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate source id '{}'", source.id)));
            }
            let t = &source.thresholds;
            if !(t.low.is_finite() && t.high.is_finite() && t.low < t.high) {
                return Err(ConfigError::Invalid(format!(
                    "{}: thresholds must be finite and ascending (low {} < high {})",
                    source.id, t.low, t.high
                )));
            }
            if source.kind == SourceKind::Tide && source.events_path.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{}: tide sources need an events_path",
                    source.id
                )));
            }
        }
        Ok(())
    }

    /// Looks up a source by id. Returns `None` if not found.
    pub fn find(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

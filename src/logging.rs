/// Structured logging for the monitoring service.
///
/// Output goes through `tracing`; `init` installs a `tracing-subscriber`
/// formatter filtered by `RUST_LOG` (default `info`). On top of that this
/// module classifies per-source failures so an offline gauge (expected,
/// logged quietly) is distinguishable from an aggregator outage or a
/// changed payload shape (unexpected, logged as errors).

use std::fmt;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::model::SourceError;

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init();
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Aggregator,
    Nws,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Aggregator => write!(f, "API"),
            DataSource::Nws => write!(f, "NWS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Gauge has nothing to report right now (offline, between updates)
    Expected,
    /// Service degradation or a payload the parsers no longer understand
    Unexpected,
    /// Cannot tell which
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

pub fn classify_failure(err: &SourceError) -> FailureType {
    match err {
        SourceError::NoData(_) | SourceError::StaleOnly(_) => FailureType::Expected,
        SourceError::HttpStatus(_) | SourceError::Parse(_) => FailureType::Unexpected,
        SourceError::Network(message) if message.contains("timed out") => FailureType::Unknown,
        SourceError::Network(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Logs a per-source failure at a level chosen by its classification.
pub fn log_source_failure(source: DataSource, source_id: &str, operation: &str, err: &SourceError) {
    let failure = classify_failure(err);
    match failure {
        FailureType::Expected => {
            debug!(%source, source_id, operation, %failure, "{}", err)
        }
        FailureType::Unexpected => {
            error!(%source, source_id, operation, %failure, "{}", err)
        }
        FailureType::Unknown => {
            warn!(%source, source_id, operation, %failure, "{}", err)
        }
    }
}

/// Logs the outcome of one refresh round. Sources with nothing current to
/// report are not failures.
pub fn log_refresh_summary(total: usize, successful: usize, no_data: usize, failed: usize) {
    if failed == 0 {
        info!(total, successful, no_data, "refresh complete");
    } else if failed == total {
        error!(total, failed, "refresh complete, every source failed");
    } else {
        warn!(total, successful, no_data, failed, "refresh complete with failures");
    }
}

/// How the monitor reaches the network.
///
/// `Transport` is the seam between refresh logic and HTTP: production uses
/// `HttpTransport` (a shared reqwest blocking client with timeout and
/// User-Agent), unit tests substitute canned bodies.

use std::time::Duration;

use crate::ingest::api::fetch_body;
use crate::model::SourceError;

const USER_AGENT: &str = concat!("waikane_monitor/", env!("CARGO_PKG_VERSION"));

/// GETs a URL and returns the body text.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<String, SourceError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Builds a client whose requests fail with `SourceError::Network` after
    /// `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<String, SourceError> {
        fetch_body(&self.client, url)
    }
}

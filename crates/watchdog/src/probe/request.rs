//! Probe execution: one HTTP exchange per test.

use std::time::{Duration, Instant};

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use super::result::WatchdogResult;
use crate::definition::{Payload, WatchdogTest};

/// Timeout applied to each probe unless configured otherwise
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = concat!("api-watchdog/", env!("CARGO_PKG_VERSION"));

/// Why a probe got no usable HTTP response
#[derive(Debug, Error)]
pub enum TransportFailure {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected failure: {0}")]
    Other(String),
}

impl TransportFailure {
    /// Synthetic HTTP status reported for this failure
    pub fn status(&self) -> u16 {
        match self {
            TransportFailure::Timeout(_) => 408,
            TransportFailure::Request(_) => 503,
            TransportFailure::Other(_) => 500,
        }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportFailure::Timeout(err.to_string())
        } else if err.is_builder() {
            TransportFailure::Other(err.to_string())
        } else {
            TransportFailure::Request(err.to_string())
        }
    }
}

/// Whether `status` is in the client or server error range
pub fn is_error_status(status: u16) -> bool {
    (400..=599).contains(&status)
}

/// Executes probes with a shared HTTP client
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    client: reqwest::Client,
}

impl ProbeExecutor {
    /// Create an executor whose requests give up after `timeout`.
    ///
    /// Proxy settings are taken from the usual `HTTP(S)_PROXY` variables.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).user_agent(USER_AGENT).build()?;

        Ok(Self { client })
    }

    /// Create an executor around an already configured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Probe the test's target and evaluate its expectations
    pub async fn execute(&self, test: &WatchdogTest) -> WatchdogResult {
        let start = Instant::now();
        let outcome = self.perform_request(test).await;
        let latency = start.elapsed().as_secs_f64();

        let (status, body) = match outcome {
            Ok(exchange) => exchange,
            Err(failure) => {
                error!("{}: {}", test.name(), failure);
                return WatchdogResult::network_failure(test, latency, failure.status());
            }
        };

        info!("{}: {}", test.name(), status);

        let Some(body) = body else {
            return WatchdogResult::network_failure(test, latency, status);
        };

        match serde_json::from_slice::<Value>(&body) {
            Ok(response) => WatchdogResult::evaluated(test, latency, status, response),
            Err(err) => {
                warn!("{}: response body is not valid JSON: {}", test.name(), err);
                WatchdogResult::malformed_response(test, latency, status)
            }
        }
    }

    /// Send the request and read the whole body.
    ///
    /// The body of an error status is never read, so a broken error page
    /// still reports its own status.
    pub async fn perform_request(
        &self,
        test: &WatchdogTest,
    ) -> Result<(u16, Option<Bytes>), TransportFailure> {
        let mut request = self.client.request(test.method().clone(), test.target());

        if let Some(body) = test.payload().and_then(Payload::body) {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if is_error_status(status) {
            return Ok((status, None));
        }

        let body = response.bytes().await?;
        Ok((status, Some(body)))
    }
}

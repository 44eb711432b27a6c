//! Per-test result records and the constructors used by the executor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::definition::{Payload, WatchdogTest};
use crate::expectation::{self, ExpectationResult, Outcome};

/// Result of running one test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchdogResult {
    pub test_name: String,
    pub target: String,
    pub success: bool,

    /// Wall-clock seconds spent on the request and response body
    pub latency: f64,

    /// When the probe completed
    pub timestamp: DateTime<Utc>,

    /// HTTP status code, synthetic for transport failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    pub payload: Option<Payload>,

    /// Parsed response, absent when the probe failed before parsing
    pub response: Option<Value>,

    pub results: Vec<ExpectationResult>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub email_to: Vec<String>,
}

impl WatchdogResult {
    fn base(test: &WatchdogTest, latency: f64, status: Option<u16>) -> Self {
        Self {
            test_name: test.name().to_string(),
            target: test.target().to_string(),
            success: false,
            latency,
            timestamp: Utc::now(),
            status,
            payload: test.payload().cloned(),
            response: None,
            results: Vec::new(),
            email_to: test.email_to().to_vec(),
        }
    }

    /// Every expectation of `test` marked with the same outcome, nothing parsed
    fn failed(test: &WatchdogTest, latency: f64, status: Option<u16>, outcome: Outcome) -> Self {
        let results = test
            .expectations()
            .iter()
            .map(|expectation| ExpectationResult::without_value(expectation, outcome))
            .collect();

        Self { results, ..Self::base(test, latency, status) }
    }

    /// Build the result for a transport failure or an HTTP error status
    pub fn network_failure(test: &WatchdogTest, latency: f64, status: u16) -> Self {
        Self::failed(test, latency, Some(status), Outcome::NetworkError { status })
    }

    /// Build the result for a response whose body is not JSON
    pub fn malformed_response(test: &WatchdogTest, latency: f64, status: u16) -> Self {
        Self::failed(test, latency, Some(status), Outcome::MalformedResponse)
    }

    /// Evaluate every expectation of `test` against the parsed response
    pub fn evaluated(test: &WatchdogTest, latency: f64, status: u16, response: Value) -> Self {
        let results = expectation::evaluate_expectations(test.expectations(), &response);
        let success = expectation::fold_success(&results);

        Self {
            success,
            response: Some(response),
            results,
            ..Self::base(test, latency, Some(status))
        }
    }

    /// Results that made this test fail
    pub fn critical_failures(&self) -> impl Iterator<Item = &ExpectationResult> {
        self.results.iter().filter(|result| result.is_critical_failure())
    }
}

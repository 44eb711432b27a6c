//! Expectation engine.
//!
//! Each expectation's selector is run against the full response. Every match
//! is validated and compared on its own and yields one [`ExpectationResult`].
//! A failing selector yields exactly one `SelectorError` result and does not
//! stop the remaining expectations.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::definition::Expectation;
use crate::selector::Selector;

/// Outcome of checking one matched value, or of a whole probe failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Validated fine but differs from the expected value
    ValueMismatch,
    /// Could not be coerced into the expectation's validation type
    ValidationError,
    /// The selector failed to compile or run
    SelectorError,
    /// The probe failed with this (possibly synthetic) HTTP status
    NetworkError { status: u16 },
    /// The response body was not valid JSON
    MalformedResponse,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::ValueMismatch => write!(f, "value mismatch"),
            Outcome::ValidationError => write!(f, "validation error"),
            Outcome::SelectorError => write!(f, "selector error"),
            Outcome::NetworkError { status } => write!(f, "network error ({status})"),
            Outcome::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

/// Result of one expectation against one matched value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectationResult {
    pub expectation: Arc<Expectation>,
    #[serde(rename = "result")]
    pub outcome: Outcome,
    pub actual: Option<Value>,
}

impl ExpectationResult {
    /// Result carrying no extracted value
    pub fn without_value(expectation: &Arc<Expectation>, outcome: Outcome) -> Self {
        Self { expectation: Arc::clone(expectation), outcome, actual: None }
    }

    /// Whether this result counts against the test
    pub fn is_critical_failure(&self) -> bool {
        self.expectation.level.is_critical() && !self.outcome.is_success()
    }
}

/// Validate `value` and compare it with the expected value
pub fn resolve(expectation: &Arc<Expectation>, value: &Value) -> ExpectationResult {
    let (outcome, actual) = match expectation.validation_type.validate(value) {
        Err(err) => {
            debug!("Expectation {} failed validation: {}", expectation.selector, err);
            (Outcome::ValidationError, value.clone())
        }
        Ok(validated) if json_eq(&validated, &expectation.value) => (Outcome::Success, validated),
        Ok(validated) => (Outcome::ValueMismatch, validated),
    };

    ExpectationResult { expectation: Arc::clone(expectation), outcome, actual: Some(actual) }
}

/// Run every expectation against a parsed response
pub fn evaluate_expectations(
    expectations: &[Arc<Expectation>],
    response: &Value,
) -> Vec<ExpectationResult> {
    let mut results = Vec::new();

    for expectation in expectations {
        let matches = Selector::parse(&expectation.selector)
            .and_then(|selector| selector.evaluate(response));

        match matches {
            Ok(values) => {
                results.extend(values.iter().map(|value| resolve(expectation, value)));
            }
            Err(err) => {
                debug!("Selector {:?} failed: {}", expectation.selector, err);
                results.push(ExpectationResult::without_value(expectation, Outcome::SelectorError));
            }
        }
    }

    results
}

/// A test passes when every result of a critical expectation is a success
pub fn fold_success(results: &[ExpectationResult]) -> bool {
    !results.iter().any(ExpectationResult::is_critical_failure)
}

/// Structural equality where numbers compare by value, so `1` equals `1.0`
pub fn json_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a == b
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                a == b
            } else {
                a.as_f64() == b.as_f64()
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, x)| b.get(key).is_some_and(|y| json_eq(x, y)))
        }
        _ => lhs == rhs,
    }
}

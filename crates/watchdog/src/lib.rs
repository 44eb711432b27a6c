//! Watchdog - synthetic monitoring for JSON APIs
//!
//! Tests describe a request and a list of expectations about the JSON that
//! comes back. The runner probes every target concurrently, resolves each
//! expectation with a jq-style selector and a typed validator, and the
//! results are grouped by host and path for reporting.

pub mod collect;
pub mod definition;
pub mod expectation;
pub mod notify;
pub mod probe;
pub mod report;
pub mod runner;
pub mod selector;
pub mod validation;

// Re-export main types
pub use collect::{ResultGroup, collect_results};
pub use definition::{Expectation, ExpectationLevel, Payload, TestDefinition, WatchdogTest};
pub use expectation::{ExpectationResult, Outcome};
pub use probe::{ProbeExecutor, WatchdogResult};
pub use runner::WatchdogRunner;
pub use validation::ValidationType;

/// Re-export common error types
pub use anyhow;

/// Watchdog result type using anyhow for error handling
pub type Result<T> = anyhow::Result<T>;

//! Notifications about finished tests.
//!
//! The runner knows nothing about delivery. Anything that can send a message
//! to an address implements [`Notifier`]; [`notify_results`] decides which
//! results are worth a message and composes it.

mod mailgun;

use std::fmt::Write as _;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::probe::WatchdogResult;

pub use mailgun::{MailgunConfig, MailgunNotifier};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier is not configured: {0}")]
    NotConfigured(String),

    #[error("failed to send message: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("message rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Capability to deliver a plain-text message
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Which results trigger a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotifyPolicy {
    #[default]
    FailuresOnly,
    Always,
}

impl NotifyPolicy {
    fn selects(self, result: &WatchdogResult) -> bool {
        match self {
            NotifyPolicy::FailuresOnly => !result.success,
            NotifyPolicy::Always => true,
        }
    }
}

/// Delivery counts of one notification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifySummary {
    pub sent: usize,
    pub failed: usize,
}

/// Subject line for a result
pub fn compose_subject(result: &WatchdogResult) -> String {
    let verdict = if result.success { "PASS" } else { "FAIL" };
    format!("[api-watchdog] {}: {}", result.test_name, verdict)
}

/// Plain-text body for a result
pub fn compose_body(result: &WatchdogResult) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Test:      {}", result.test_name);
    let _ = writeln!(body, "Target:    {}", result.target);
    let _ = writeln!(body, "Result:    {}", if result.success { "Pass" } else { "Fail" });
    let _ = writeln!(body, "Latency:   {:.3}s", result.latency);
    if let Some(status) = result.status {
        let _ = writeln!(body, "Status:    {status}");
    }
    let _ = writeln!(body, "Completed: {}", result.timestamp.to_rfc3339());

    let failures: Vec<_> = result.critical_failures().collect();
    if !failures.is_empty() {
        let _ = writeln!(body, "\nFailed expectations:");
        for failure in failures {
            let actual = failure.actual.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string());
            let _ = writeln!(
                body,
                "  {} expected {} got {} ({})",
                failure.expectation.selector, failure.expectation.value, actual, failure.outcome
            );
        }
    }

    body
}

/// Send a message for every selected result to each of its recipients.
///
/// Delivery failures are logged and counted, never returned.
pub async fn notify_results(
    results: &[WatchdogResult],
    notifier: &dyn Notifier,
    policy: NotifyPolicy,
) -> NotifySummary {
    let mut summary = NotifySummary::default();

    for result in results.iter().filter(|result| policy.selects(result)) {
        if result.email_to.is_empty() {
            continue;
        }

        let subject = compose_subject(result);
        let body = compose_body(result);
        for recipient in &result.email_to {
            match notifier.send(recipient, &subject, &body).await {
                Ok(()) => {
                    info!("Notified {} about {}", recipient, result.test_name);
                    summary.sent += 1;
                }
                Err(e) => {
                    warn!("Failed to notify {} about {}: {}", recipient, result.test_name, e);
                    summary.failed += 1;
                }
            }
        }
    }

    summary
}

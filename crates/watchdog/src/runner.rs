//! Concurrent runner - fans tests out over a bounded pool of workers.
//!
//! Every test runs in its own task; at most `max_workers` probes are in
//! flight at once. Results are delivered as they complete, so their order is
//! unrelated to the input order. Sort them (e.g. by test name) before
//! building a report.
//!
//! Workers are owned by the returned [`ResultStream`] (or by the
//! `run_tests` future). Dropping either aborts whatever is still queued or
//! in flight.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::definition::WatchdogTest;
use crate::probe::{ProbeExecutor, WatchdogResult};

/// Number of probes allowed in flight when none is configured
pub const DEFAULT_MAX_WORKERS: usize = 16;

/// Status reported for a probe whose worker panicked
const WORKER_PANIC_STATUS: u16 = 500;

/// Runs collections of tests against their targets
#[derive(Debug, Clone)]
pub struct WatchdogRunner {
    executor: Arc<ProbeExecutor>,
    max_workers: usize,
}

impl WatchdogRunner {
    /// Create a runner with its own HTTP client
    pub fn new(max_workers: usize, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::with_executor(ProbeExecutor::new(timeout)?, max_workers))
    }

    /// Create a runner around an existing executor
    pub fn with_executor(executor: ProbeExecutor, max_workers: usize) -> Self {
        Self { executor: Arc::new(executor), max_workers: max_workers.max(1) }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run a single test on the current task
    pub async fn run_test(&self, test: &WatchdogTest) -> WatchdogResult {
        self.executor.execute(test).await
    }

    /// Start every test and stream results back as they complete.
    ///
    /// The stream ends once each test has delivered exactly one result.
    pub fn spawn_tests<I>(&self, tests: I) -> ResultStream
    where
        I: IntoIterator<Item = WatchdogTest>,
    {
        let tests: Vec<WatchdogTest> = tests.into_iter().collect();
        let (result_tx, result_rx) = mpsc::channel(tests.len().max(1));
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut workers = JoinSet::new();

        debug!("Dispatching {} tests over {} workers", tests.len(), self.max_workers);

        for test in tests {
            let executor = self.executor.clone();
            let permits = permits.clone();
            let result_tx = result_tx.clone();

            workers.spawn(async move {
                // The semaphore is never closed, so acquiring only waits
                let _permit = permits.acquire_owned().await.ok();

                if result_tx.is_closed() {
                    debug!("{}: results dropped, not starting", test.name());
                    return;
                }

                let start = Instant::now();
                let result = AssertUnwindSafe(executor.execute(&test))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        error!("{}: probe worker panicked", test.name());
                        WatchdogResult::network_failure(
                            &test,
                            start.elapsed().as_secs_f64(),
                            WORKER_PANIC_STATUS,
                        )
                    });

                if let Err(e) = result_tx.send(result).await {
                    debug!("Result for {} was not collected: {}", test.name(), e);
                }
            });
        }

        ResultStream { results: result_rx, workers }
    }

    /// Run every test and wait for all of them.
    ///
    /// Returns one result per test, in completion order. Dropping the
    /// returned future cancels the remaining tests.
    pub async fn run_tests<I>(&self, tests: I) -> Vec<WatchdogResult>
    where
        I: IntoIterator<Item = WatchdogTest>,
    {
        let mut stream = self.spawn_tests(tests);
        let mut results = Vec::new();

        while let Some(result) = stream.recv().await {
            results.push(result);
        }

        results
    }
}

/// Results of a batch started by [`WatchdogRunner::spawn_tests`].
///
/// Owns the worker tasks: dropping the stream aborts every test that has not
/// finished yet.
#[derive(Debug)]
pub struct ResultStream {
    results: mpsc::Receiver<WatchdogResult>,
    workers: JoinSet<()>,
}

impl ResultStream {
    /// Next finished result, or `None` once every test has reported
    pub async fn recv(&mut self) -> Option<WatchdogResult> {
        let result = self.results.recv().await;
        // Reap workers that already delivered
        while self.workers.try_join_next().is_some() {}
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_max_workers_is_at_least_one() {
        let runner = WatchdogRunner::new(0, Duration::from_secs(1)).unwrap();
        assert_eq!(runner.max_workers(), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_yields_one_result() {
        // Refused or timed out, either way a failed result comes back
        let test = WatchdogTest::from_json(json!({
            "name": "unreachable",
            "target": "http://127.0.0.1:9/",
            "expectations": [{"selector": ".ok", "value": true}]
        }))
        .unwrap();

        let runner = WatchdogRunner::new(DEFAULT_MAX_WORKERS, Duration::from_secs(2)).unwrap();
        let results = runner.run_tests(vec![test]).await;

        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].status.is_some_and(|status| status >= 400));
    }
}

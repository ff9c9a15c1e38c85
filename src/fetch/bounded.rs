//! Deadline-bounded execution of a single transfer.
//!
//! The transfer runs as its own tokio task. The caller waits at most the
//! budget; completion wakes it early. When the budget expires the task is
//! aborted, so a timed-out transfer cannot keep a socket open or deliver
//! bytes afterwards.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::FetchError;

/// What a finished transfer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// The complete body.
    Body(Bytes),
    /// The server reported that the resource moved.
    Moved(String),
}

/// Classified result of a bounded fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The transfer delivered the complete body.
    Success(Bytes),
    /// The resource moved; not an error.
    Redirect(String),
    /// The transfer failed before the deadline.
    Failure(FetchError),
    /// The deadline expired first. Never carries partial bytes.
    Timeout,
}

impl FetchOutcome {
    /// Returns a short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Redirect(_) => "redirect",
            Self::Failure(_) => "failure",
            Self::Timeout => "timeout",
        }
    }
}

/// Aborts the wrapped task when dropped, including when the waiting future
/// itself is cancelled.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs transfers under a wall-clock budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedFetch {
    budget: Duration,
}

impl BoundedFetch {
    /// Creates a runner with the given budget.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// Returns the budget.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Runs `transfer` for `url` and classifies the result.
    ///
    /// Priority once the wait ends: bytes, then redirect, then error, then
    /// timeout. A panicking transfer is reported as a failure.
    pub async fn run<F>(&self, url: &str, transfer: F) -> FetchOutcome
    where
        F: Future<Output = Result<Transfer, FetchError>> + Send + 'static,
    {
        let mut task = AbortOnDrop(tokio::spawn(transfer));
        match tokio::time::timeout(self.budget, &mut task.0).await {
            Ok(Ok(Ok(Transfer::Body(bytes)))) => FetchOutcome::Success(bytes),
            Ok(Ok(Ok(Transfer::Moved(target)))) => {
                debug!(url, target = %target, "transfer reported redirect");
                FetchOutcome::Redirect(target)
            }
            Ok(Ok(Err(error))) => FetchOutcome::Failure(error),
            Ok(Err(join_error)) => {
                warn!(url, error = %join_error, "transfer task did not complete");
                FetchOutcome::Failure(FetchError::unavailable_with(
                    url,
                    "transfer task failed",
                    join_error,
                ))
            }
            Err(_) => {
                debug!(
                    url,
                    budget_secs = self.budget.as_secs_f64(),
                    "transfer exceeded budget, aborting"
                );
                task.0.abort();
                FetchOutcome::Timeout
            }
        }
    }
}

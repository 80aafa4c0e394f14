//! Core collector traits and types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::ConfigError;
use crate::context::{Backend, ProbeError};
use crate::sink::CallbackError;

use super::tick::DoneGuard;

/// Minimum allowed poll interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that can occur across the collector lifecycle.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Invalid or incomplete configuration; fatal at construction.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The backend could not be brought up or is not ready.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A device probe failed for one tick.
    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    /// The sink rejected a record for one tick.
    #[error("callback failed: {0}")]
    Callback(#[from] CallbackError),

    /// Backend teardown failed.
    #[error("cleanup failed: {0}")]
    Cleanup(String),

    /// The poll task panicked before reporting.
    #[error("poll panicked: {0}")]
    Panicked(String),

    /// A collector name was registered twice.
    #[error("collector '{0}' is already registered")]
    Duplicate(String),
}

/// Clamp a poll interval to [`MIN_INTERVAL`].
pub fn clamp_interval(duration: Duration) -> Duration {
    if duration < MIN_INTERVAL {
        tracing::warn!(min_interval = ?MIN_INTERVAL,
            "Interval duration is less than minimum allowed. Using minimum duration."
        );
        MIN_INTERVAL
    } else {
        duration
    }
}

/// Outcome of one collector's poll in one tick.
#[derive(Debug)]
pub struct PollResult {
    /// Collector that produced the result.
    pub collector: String,
    /// Errors in the order they occurred; empty means success.
    pub errors: Vec<CollectorError>,
    /// When the poll finished.
    pub ts: DateTime<Utc>,
}

impl PollResult {
    /// Create a result stamped with the current time.
    pub fn new(collector: impl Into<String>, errors: Vec<CollectorError>) -> Self {
        Self {
            collector: collector.into(),
            errors,
            ts: Utc::now(),
        }
    }

    /// Whether the poll succeeded.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Core collector trait.
///
/// A collector binds one [`Context`](crate::context::Context), one probe and
/// the callback sink. The orchestrator drives it through
/// `start -> poll* -> cleanup`; all methods take `&self` so a collector can be
/// shared with the per-tick poll task.
///
/// # Error Handling Philosophy
///
/// - `start`/`cleanup` errors are returned to the orchestrator, which decides
///   whether they are fatal based on the collector's requirement class.
/// - `collect` errors are never raised past `poll`: they are captured in the
///   tick's [`PollResult`].
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Collector name used in results and logs.
    fn name(&self) -> &str;

    /// Backend this collector was constructed with.
    fn backend(&self) -> Backend;

    /// Whether `start` has run and `cleanup` has not.
    fn is_running(&self) -> bool;

    /// Prepare the backend. Calling it again after success is a no-op.
    async fn start(&self) -> Result<(), CollectorError>;

    /// Run exactly one device probe and forward the record to the sink.
    async fn collect(&self) -> Result<(), CollectorError>;

    /// Poll once, reporting into `results` and releasing `done`.
    ///
    /// `done` is released on every path, so the orchestrator's fan-in cannot
    /// hang on a failing collector. A result is sent unless `collect` panics;
    /// the orchestrator reports that case from the task's join error.
    async fn poll(&self, results: mpsc::Sender<PollResult>, done: DoneGuard) {
        let _done = done;
        let errors = match self.collect().await {
            Ok(()) => Vec::new(),
            Err(e) => vec![e],
        };
        if results
            .send(PollResult::new(self.name(), errors))
            .await
            .is_err()
        {
            tracing::warn!(collector = %self.name(), "Results channel closed, poll result dropped");
        }
    }

    /// Tear down what `start` set up.
    async fn cleanup(&self) -> Result<(), CollectorError>;
}

//! Poll orchestrator.
//!
//! Owns the collectors built for one run and drives them:
//!
//! 1. construct every registered collector (required failures abort)
//! 2. start them in registration order (required failures abort, after
//!    cleaning up everything already started)
//! 3. on every tick, poll all running collectors concurrently and collect
//!    exactly one [`PollResult`] per poll
//! 4. on shutdown, clean up everything that was started
//!
//! Shutdown is only observed between ticks, so a tick in flight always
//! finishes its fan-in.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use strum_macros::Display;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::registry::{CollectorRegistry, Requirement};
use super::run::RunConfig;
use super::tick::TickCounter;
use super::traits::{Collector, CollectorError, PollResult, clamp_interval};

/// Lifecycle position of one managed collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum LifecycleState {
    /// Built, not started.
    Constructed,
    /// Started and polled every tick.
    Started,
    /// Start failed; still eligible for cleanup.
    StartFailed,
    /// Cleaned up.
    CleanedUp,
    /// Cleanup failed.
    CleanupFailed,
}

impl LifecycleState {
    fn needs_cleanup(self) -> bool {
        matches!(self, Self::Started | Self::StartFailed)
    }
}

struct Managed {
    collector: Arc<dyn Collector>,
    requirement: Requirement,
    state: LifecycleState,
}

/// Totals reported when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks completed.
    pub ticks: u64,
    /// Poll results carrying at least one error.
    pub failed_polls: u64,
    /// Collectors whose cleanup failed.
    pub cleanup_failures: usize,
}

/// Drives collectors through start, periodic polls and cleanup.
pub struct PollOrchestrator {
    interval: Duration,
    collectors: Vec<Managed>,
    reporter: Option<mpsc::Sender<PollResult>>,
}

impl PollOrchestrator {
    /// Orchestrator over already-built collectors, in the given order.
    pub fn new(interval: Duration, collectors: Vec<(Arc<dyn Collector>, Requirement)>) -> Self {
        Self {
            interval: clamp_interval(interval),
            collectors: collectors
                .into_iter()
                .map(|(collector, requirement)| Managed {
                    collector,
                    requirement,
                    state: LifecycleState::Constructed,
                })
                .collect(),
            reporter: None,
        }
    }

    /// Build every registered collector for this run.
    ///
    /// Optional collectors that fail to build are logged and left out.
    ///
    /// # Errors
    /// Returns the construction error of the first required collector that
    /// fails to build.
    pub async fn build(registry: &CollectorRegistry, config: &RunConfig) -> Result<Self, CollectorError> {
        let mut collectors = Vec::with_capacity(registry.len());
        for spec in registry.specs() {
            match spec.factory().build(config).await {
                Ok(collector) => {
                    tracing::debug!(collector = %spec.name(), backend = %collector.backend(), "Collector constructed");
                    collectors.push((collector, spec.requirement()));
                }
                Err(e) if spec.requirement() == Requirement::Required => {
                    tracing::error!(collector = %spec.name(), error = %e, "Required collector failed to construct");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(collector = %spec.name(), error = %e, "Optional collector unavailable, skipping");
                }
            }
        }
        Ok(Self::new(config.poll_interval, collectors))
    }

    /// Forward every poll result to `reporter` as well.
    pub fn with_reporter(mut self, reporter: mpsc::Sender<PollResult>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Effective poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Collector names with their lifecycle states, in order.
    pub fn states(&self) -> Vec<(String, LifecycleState)> {
        self.collectors
            .iter()
            .map(|m| (m.collector.name().to_string(), m.state))
            .collect()
    }

    /// Number of collectors polled each tick.
    pub fn active_count(&self) -> usize {
        self.collectors
            .iter()
            .filter(|m| m.state == LifecycleState::Started)
            .count()
    }

    /// Start collectors in order.
    ///
    /// A failed optional collector is cleaned up at once and not polled. A
    /// failed required collector stops the sequence; the caller is expected
    /// to run [`PollOrchestrator::cleanup`] afterwards.
    ///
    /// # Errors
    /// Returns the start error of the first failing required collector.
    pub async fn start(&mut self) -> Result<(), CollectorError> {
        for managed in &mut self.collectors {
            if managed.state != LifecycleState::Constructed {
                continue;
            }
            let name = managed.collector.name().to_string();
            match managed.collector.start().await {
                Ok(()) => {
                    managed.state = LifecycleState::Started;
                    tracing::debug!(collector = %name, "Collector running");
                }
                Err(e) => {
                    managed.state = LifecycleState::StartFailed;
                    if managed.requirement == Requirement::Required {
                        tracing::error!(collector = %name, error = %e, "Required collector failed to start");
                        return Err(e);
                    }
                    tracing::warn!(collector = %name, error = %e, "Optional collector failed to start, dropping");
                    managed.state = cleanup_one(managed.collector.as_ref()).await;
                }
            }
        }
        Ok(())
    }

    /// Poll every running collector once and gather all results.
    ///
    /// Returns exactly one result per polled collector, in completion order.
    /// A poll that panics is reported as a [`CollectorError::Panicked`] result.
    pub async fn tick(&self) -> Vec<PollResult> {
        let active: Vec<Arc<dyn Collector>> = self
            .collectors
            .iter()
            .filter(|m| m.state == LifecycleState::Started)
            .map(|m| Arc::clone(&m.collector))
            .collect();
        let count = active.len();
        if count == 0 {
            return Vec::new();
        }

        let (tx, mut rx) = mpsc::channel(count);
        let counter = TickCounter::new(count);
        let mut handles = Vec::with_capacity(count);
        for collector in active {
            let results = tx.clone();
            let done = counter.guard();
            let name = collector.name().to_string();
            handles.push((name, tokio::spawn(async move { collector.poll(results, done).await })));
        }
        drop(tx);

        let mut results = Vec::with_capacity(count);
        while results.len() < count {
            match rx.recv().await {
                Some(result) => results.push(result),
                None => break,
            }
        }
        counter.wait().await;

        for (name, handle) in handles {
            let Err(e) = handle.await else { continue };
            if results.iter().any(|r| r.collector == name) {
                continue;
            }
            let reason = panic_message(e);
            tracing::error!(collector = %name, error = %reason, "Poll task ended without reporting");
            results.push(PollResult::new(name, vec![CollectorError::Panicked(reason)]));
        }
        results
    }

    /// Clean up every collector that was started or failed to start.
    ///
    /// Returns the number of cleanup failures; failures are logged and do not
    /// stop the remaining cleanups.
    pub async fn cleanup(&mut self) -> usize {
        let mut failures = 0;
        for managed in &mut self.collectors {
            if !managed.state.needs_cleanup() {
                continue;
            }
            managed.state = cleanup_one(managed.collector.as_ref()).await;
            if managed.state == LifecycleState::CleanupFailed {
                failures += 1;
            }
        }
        failures
    }

    /// Start, tick until `shutdown` resolves, then clean up.
    ///
    /// # Errors
    /// Returns the start error of a required collector; everything started
    /// before it has been cleaned up by then.
    pub async fn run<F>(mut self, shutdown: F) -> Result<RunSummary, CollectorError>
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.start().await {
            let failures = self.cleanup().await;
            if failures > 0 {
                tracing::warn!(failures, "Cleanup after failed start was incomplete");
            }
            return Err(e);
        }

        tracing::info!(
            collectors = self.active_count(),
            interval = ?self.interval,
            "Polling started"
        );

        let mut summary = RunSummary::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping polls");
                    break;
                }
                _ = ticker.tick() => {
                    let results = self.tick().await;
                    summary.ticks += 1;
                    for result in results {
                        self.record(&mut summary, result).await;
                    }
                }
            }
        }

        summary.cleanup_failures = self.cleanup().await;
        tracing::info!(
            ticks = summary.ticks,
            failed_polls = summary.failed_polls,
            cleanup_failures = summary.cleanup_failures,
            "Polling stopped"
        );
        Ok(summary)
    }

    async fn record(&self, summary: &mut RunSummary, result: PollResult) {
        if !result.is_success() {
            summary.failed_polls += 1;
            for error in &result.errors {
                tracing::warn!(collector = %result.collector, error = %error, "Poll failed");
            }
        }
        if let Some(reporter) = &self.reporter
            && reporter.send(result).await.is_err()
        {
            tracing::debug!("Result reporter closed");
        }
    }
}

async fn cleanup_one(collector: &dyn Collector) -> LifecycleState {
    match collector.cleanup().await {
        Ok(()) => {
            tracing::debug!(collector = %collector.name(), "Collector cleaned up");
            LifecycleState::CleanedUp
        }
        Err(e) => {
            tracing::error!(collector = %collector.name(), error = %e, "Collector cleanup failed");
            LifecycleState::CleanupFailed
        }
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for PollOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollOrchestrator")
            .field("interval", &self.interval)
            .field("collectors", &self.states())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::test_support::{FakeCollector, FakeFactory, run_config};

    fn orchestrator(collectors: Vec<(Arc<FakeCollector>, Requirement)>) -> PollOrchestrator {
        PollOrchestrator::new(
            Duration::from_secs(1),
            collectors
                .into_iter()
                .map(|(c, r)| (c as Arc<dyn Collector>, r))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_one_result_per_poll_under_faults() {
        let ok = Arc::new(FakeCollector::new("ok"));
        let failing = Arc::new(FakeCollector::new("failing").fail_collect());
        let slow = Arc::new(FakeCollector::new("slow").with_delay(Duration::from_millis(20)));
        let panicking = Arc::new(FakeCollector::new("panicking").panic_collect());
        let mut orch = orchestrator(vec![
            (ok.clone(), Requirement::Optional),
            (failing.clone(), Requirement::Optional),
            (slow.clone(), Requirement::Optional),
            (panicking.clone(), Requirement::Optional),
        ]);
        orch.start().await.unwrap();

        for _ in 0..3 {
            let results = orch.tick().await;
            let mut names: Vec<_> = results.iter().map(|r| r.collector.as_str()).collect();
            names.sort_unstable();
            assert_eq!(names, ["failing", "ok", "panicking", "slow"]);
            let failed = results.iter().find(|r| r.collector == "failing").unwrap();
            assert_eq!(failed.errors.len(), 1);
            let panicked = results.iter().find(|r| r.collector == "panicking").unwrap();
            assert!(matches!(
                panicked.errors.as_slice(),
                [CollectorError::Panicked(msg)] if msg == "injected collect panic"
            ));
        }
        assert_eq!(ok.collects(), 3);
        assert_eq!(slow.collects(), 3);
    }

    #[tokio::test]
    async fn test_panicking_poll_counts_as_failed() {
        let ok = Arc::new(FakeCollector::new("ok"));
        let panicking = Arc::new(FakeCollector::new("panicking").panic_collect());
        let mut orch = orchestrator(vec![
            (ok.clone(), Requirement::Optional),
            (panicking.clone(), Requirement::Optional),
        ]);
        orch.start().await.unwrap();

        let results = orch.tick().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| !r.is_success()).count(), 1);
    }

    #[tokio::test]
    async fn test_optional_start_failure_is_dropped() {
        let ok = Arc::new(FakeCollector::new("ok"));
        let broken = Arc::new(FakeCollector::new("broken").fail_start());
        let mut orch = orchestrator(vec![
            (broken.clone(), Requirement::Optional),
            (ok.clone(), Requirement::Optional),
        ]);

        orch.start().await.unwrap();
        assert_eq!(orch.active_count(), 1);
        assert_eq!(broken.cleanups(), 1);
        assert_eq!(
            orch.states(),
            [
                ("broken".to_string(), LifecycleState::CleanedUp),
                ("ok".to_string(), LifecycleState::Started),
            ]
        );

        let results = orch.tick().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].collector, "ok");
        assert_eq!(broken.collects(), 0);
    }

    #[tokio::test]
    async fn test_required_start_failure_aborts_before_polling() {
        let first = Arc::new(FakeCollector::new("first"));
        let required = Arc::new(FakeCollector::new("required").fail_start());
        let never = Arc::new(FakeCollector::new("never"));
        let orch = orchestrator(vec![
            (first.clone(), Requirement::Optional),
            (required.clone(), Requirement::Required),
            (never.clone(), Requirement::Optional),
        ]);

        let err = orch.run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, CollectorError::BackendUnavailable(_)));

        assert_eq!(first.collects() + required.collects() + never.collects(), 0);
        // Started and failed collectors are cleaned up; unstarted ones are not.
        assert_eq!(first.cleanups(), 1);
        assert_eq!(required.cleanups(), 1);
        assert_eq!(never.starts(), 0);
        assert_eq!(never.cleanups(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_stop_others() {
        let bad = Arc::new(FakeCollector::new("bad").fail_cleanup());
        let good = Arc::new(FakeCollector::new("good"));
        let mut orch = orchestrator(vec![
            (bad.clone(), Requirement::Optional),
            (good.clone(), Requirement::Optional),
        ]);
        orch.start().await.unwrap();

        assert_eq!(orch.cleanup().await, 1);
        assert_eq!(good.cleanups(), 1);
        assert_eq!(orch.states()[0].1, LifecycleState::CleanupFailed);

        // Already cleaned up collectors are not cleaned twice.
        assert_eq!(orch.cleanup().await, 0);
        assert_eq!(good.cleanups(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let collector = Arc::new(FakeCollector::new("ok"));
        let failing = Arc::new(FakeCollector::new("failing").fail_collect());
        let (tx, mut rx) = mpsc::channel(16);
        let orch = orchestrator(vec![
            (collector.clone(), Requirement::Required),
            (failing.clone(), Requirement::Optional),
        ])
        .with_reporter(tx);

        let summary = orch
            .run(tokio::time::sleep(Duration::from_millis(2500)))
            .await
            .unwrap();

        // Ticks fire at 0s, 1s and 2s.
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.failed_polls, 3);
        assert_eq!(summary.cleanup_failures, 0);
        assert_eq!(collector.collects(), 3);
        assert_eq!(collector.cleanups(), 1);
        assert!(!collector.is_running());

        let mut reported = 0;
        while rx.try_recv().is_ok() {
            reported += 1;
        }
        assert_eq!(reported, 6);
    }

    #[tokio::test]
    async fn test_build_skips_optional_and_aborts_required() {
        let config = run_config(None);

        let registry = CollectorRegistry::builder()
            .register("ok", FakeFactory::ok("ok"), Requirement::Required)
            .unwrap()
            .register("missing", FakeFactory::failing(), Requirement::Optional)
            .unwrap()
            .build();
        let orch = PollOrchestrator::build(&registry, &config).await.unwrap();
        assert_eq!(orch.states(), [("ok".to_string(), LifecycleState::Constructed)]);

        let registry = CollectorRegistry::builder()
            .register("missing", FakeFactory::failing(), Requirement::Required)
            .unwrap()
            .build();
        let err = PollOrchestrator::build(&registry, &config).await.unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[tokio::test]
    async fn test_tick_without_collectors_is_empty() {
        let orch = PollOrchestrator::new(Duration::from_secs(1), Vec::new());
        assert!(orch.tick().await.is_empty());
    }
}

//! Collector Layer
//!
//! Pluggable collectors polled on a fixed interval. Each collector owns one
//! [`Context`](crate::context::Context) and forwards decoded records to the
//! shared callback sink.
//!
//! # Architecture
//!
//! - [`Collector`]: lifecycle trait (`start`, `poll`, `cleanup`)
//! - [`CollectorRegistry`]: ordered, duplicate-free collector factories
//! - [`RunConfig`]: everything a factory needs for one run
//! - [`PollOrchestrator`]: concurrent fan-out/fan-in of polls per tick
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use timing_collector::{AppConfig, JsonLinesSink, PollOrchestrator, RunConfig, default_registry};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let app = AppConfig::load("timing-collector.yaml")?;
//! let config = RunConfig::from_app(&app, Arc::new(JsonLinesSink::new(std::io::stdout())));
//! let orchestrator = PollOrchestrator::build(&default_registry()?, &config).await?;
//! let summary = orchestrator.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! println!("{} ticks", summary.ticks);
//! # Ok(())
//! # }
//! ```

mod base;
pub mod dpll;
pub mod gnss;
mod orchestrator;
mod registry;
mod run;
mod tick;
mod traits;

pub use crate::config::{DPLL_COLLECTOR, GNSS_COLLECTOR};
pub use dpll::DpllFactory;
pub use gnss::GnssFactory;
pub use orchestrator::{LifecycleState, PollOrchestrator, RunSummary};
pub use registry::{
    CollectorFactory, CollectorRegistry, CollectorRegistryBuilder, CollectorSpec, Requirement,
};
pub use run::RunConfig;
pub use tick::{DoneGuard, TickCounter};
pub use traits::{Collector, CollectorError, MIN_INTERVAL, PollResult};

/// Registry of the collectors shipped with this crate.
///
/// Both are optional: a node without DPLL or GNSS hardware still yields the
/// other's telemetry.
///
/// # Errors
/// Returns `CollectorError::Duplicate` if a name is registered twice.
pub fn default_registry() -> Result<CollectorRegistry, CollectorError> {
    Ok(CollectorRegistry::builder()
        .register(DPLL_COLLECTOR, DpllFactory, Requirement::Optional)?
        .register(GNSS_COLLECTOR, GnssFactory, Requirement::Optional)?
        .build())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), [DPLL_COLLECTOR, GNSS_COLLECTOR]);
        assert!(
            registry
                .specs()
                .iter()
                .all(|s| s.requirement() == Requirement::Optional)
        );
    }
}

//! Timing Collector - Timing Hardware Telemetry Library
//!
//! This crate polls timing-synchronization hardware on cluster nodes (DPLL
//! lock state, GNSS receiver status) and checks device-reported versions
//! against minimums. It can be used as a library, or run as a standalone
//! binary with the `timing-collector` executable.
//!
//! # Architecture
//!
//! - **Collectors**: pluggable DPLL and GNSS collectors polled on a fixed interval
//! - **Contexts**: daemon exec, ephemeral netlink pod, or local filesystem access
//! - **Device layer**: decoders turning probe output into typed records
//! - **Sink**: callback receiving every decoded record
//! - **Validation**: semantic version checks for GNSS firmware, protocol and gpsd

pub mod cluster;
pub mod collector;
pub mod config;
pub mod context;
pub mod device;
pub mod sink;
pub mod validation;

pub use cluster::{ClusterClient, ClusterError, KubectlClient, PodRef, PodSpec};
pub use collector::{
    Collector, CollectorError, CollectorFactory, CollectorRegistry, PollOrchestrator, PollResult,
    Requirement, RunConfig, RunSummary, default_registry,
};
pub use config::{AppConfig, CollectorArgs, ConfigError};
pub use context::{Backend, Context, Probe, ProbeError};
pub use device::{ClockId, DeviceRecord};
pub use sink::{Callback, CallbackError, JsonLinesSink};
pub use validation::{ValidationError, Version, VersionCheck, verify_gnss_versions};

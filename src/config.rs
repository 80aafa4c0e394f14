//! Configuration module for timing-collector.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Poll cadence and run duration
//! - Cluster access (kubectl, daemon pod location, ephemeral pod settings)
//! - Per-collector arguments, validated into a typed union at load

mod app;
mod collector;
mod validation;

pub use app::{AppConfig, ClusterConfig, FilesystemConfig};
pub use collector::{
    CollectorArgs, CollectorsConfig, DPLL_COLLECTOR, DpllArgs, GNSS_COLLECTOR, GnssArgs,
    RawCollectorsConfig, is_valid_interface,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_INTERVAL, DEFAULT_NAMESPACE, DEFAULT_POD_TIMEOUT};

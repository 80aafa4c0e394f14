//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::collector::{CollectorsConfig, RawCollectorsConfig};
use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default poll interval (1 second).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on ephemeral pod readiness and deletion waits (60 seconds).
pub const DEFAULT_POD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default namespace of the timing daemon.
pub const DEFAULT_NAMESPACE: &str = "openshift-ptp";

/// Default label selector locating the timing daemon pod.
pub const DEFAULT_DAEMON_SELECTOR: &str = "app=linuxptp-daemon";

/// Default container inside the timing daemon pod.
pub const DEFAULT_DAEMON_CONTAINER: &str = "linuxptp-daemon-container";

/// Default image for the ephemeral netlink pod.
pub const DEFAULT_NETLINK_IMAGE: &str = "quay.io/redhat-partner-solutions/dpll-tools:latest";

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_pod_timeout() -> Duration {
    DEFAULT_POD_TIMEOUT
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_daemon_selector() -> String {
    DEFAULT_DAEMON_SELECTOR.to_string()
}

fn default_daemon_container() -> String {
    DEFAULT_DAEMON_CONTAINER.to_string()
}

fn default_netlink_image() -> String {
    DEFAULT_NETLINK_IMAGE.to_string()
}

fn default_fs_root() -> PathBuf {
    PathBuf::from("/")
}

// =============================================================================
// Cluster Configuration
// =============================================================================

/// Cluster access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// `kubectl` binary to invoke (default: "kubectl").
    #[serde(default = "default_kubectl")]
    pub kubectl: String,

    /// Optional kubeconfig path; empty means kubectl's own default.
    #[serde(default)]
    pub kubeconfig: Option<String>,

    /// Namespace of the timing daemon and the ephemeral pod.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Node whose hardware is observed; the ephemeral pod is pinned to it.
    #[serde(default)]
    pub node_name: Option<String>,

    /// Label selector locating the timing daemon pod.
    #[serde(default = "default_daemon_selector")]
    pub daemon_selector: String,

    /// Container inside the daemon pod that runs probes.
    #[serde(default = "default_daemon_container")]
    pub daemon_container: String,

    /// Image for the ephemeral netlink pod.
    #[serde(default = "default_netlink_image")]
    pub netlink_image: String,

    /// Bound on waiting for the ephemeral pod to become ready.
    #[serde(default = "default_pod_timeout", with = "humantime_serde")]
    pub ready_timeout: Duration,

    /// Bound on waiting for the ephemeral pod to disappear.
    #[serde(default = "default_pod_timeout", with = "humantime_serde")]
    pub delete_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            kubeconfig: None,
            namespace: default_namespace(),
            node_name: None,
            daemon_selector: default_daemon_selector(),
            daemon_container: default_daemon_container(),
            netlink_image: default_netlink_image(),
            ready_timeout: DEFAULT_POD_TIMEOUT,
            delete_timeout: DEFAULT_POD_TIMEOUT,
        }
    }
}

/// Local filesystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Root under which `sys/class/net` is looked up (default: "/").
    #[serde(default = "default_fs_root")]
    pub root: PathBuf,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            root: default_fs_root(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Poll interval (default: 1s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// How long to run; absent means until interrupted.
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,

    /// JSON-lines output file; absent means stdout.
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Cluster access settings.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Local filesystem settings.
    #[serde(default)]
    pub filesystem: FilesystemConfig,

    /// Collector argument bags as written in the file.
    #[serde(default, rename = "collectors")]
    raw_collectors: RawCollectorsConfig,

    /// Typed collector arguments, populated by [`AppConfig::from_yaml`].
    #[serde(skip)]
    collectors: CollectorsConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded first.
    ///
    /// # Errors
    /// Returns `ConfigError` if the text cannot be parsed or validated.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let mut config: Self = serde_yaml::from_str(&expanded)?;
        config.collectors = CollectorsConfig::from_raw(&config.raw_collectors)?;
        config.validate()?;
        Ok(config)
    }

    /// Validated collector arguments.
    pub fn collectors(&self) -> &CollectorsConfig {
        &self.collectors
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "interval must be non-zero".to_string(),
            ));
        }

        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ValidationError(
                "duration must be non-zero when set".to_string(),
            ));
        }

        if self.cluster.ready_timeout.is_zero() || self.cluster.delete_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "cluster ready_timeout and delete_timeout must be non-zero".to_string(),
            ));
        }

        if self.cluster.kubectl.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "cluster kubectl cannot be empty".to_string(),
            ));
        }

        if self.collectors.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one collector must be configured".to_string(),
            ));
        }

        Ok(())
    }

    /// Kubeconfig path, treating an empty value as unset.
    pub fn kubeconfig(&self) -> Option<&str> {
        self.cluster
            .kubeconfig
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

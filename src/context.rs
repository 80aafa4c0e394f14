//! Execution contexts.
//!
//! A [`Context`] is the one thing a collector needs to reach hardware: it runs
//! a named, interface-scoped [`Probe`] and hands back raw bytes for the device
//! layer to decode. Three backends implement that capability:
//!
//! - [`DaemonExecContext`]: exec inside the long-lived timing daemon pod
//! - [`NetlinkContext`]: an ephemeral privileged pod created for netlink queries
//! - [`FilesystemContext`]: direct reads of local sysfs paths
//!
//! A collector picks its backend at construction and keeps it for life.

mod daemon;
mod filesystem;
mod netlink;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::cluster::{ClusterClient, ClusterError};
use crate::collector::RunConfig;
use crate::config::{AppConfig, ClusterConfig, ConfigError};
use crate::device::ClockId;

pub use daemon::DaemonExecContext;
pub use filesystem::FilesystemContext;
pub use netlink::NetlinkContext;

/// Errors produced while running or decoding a probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The cluster client failed to run the probe.
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// A local read failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Probe output could not be decoded into a record.
    #[error("failed to decode {probe}: {reason}")]
    Decode {
        /// Probe name.
        probe: &'static str,
        /// What was wrong with the output.
        reason: String,
    },

    /// The backend cannot serve this probe.
    #[error("probe {probe} is not supported by the {backend} backend")]
    Unsupported {
        /// Probe name.
        probe: &'static str,
        /// Backend asked to run it.
        backend: Backend,
    },
}

impl ProbeError {
    /// Build a decode error for `probe`.
    pub fn decode(probe: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            probe,
            reason: reason.into(),
        }
    }
}

/// Backend kinds a [`Context`] can be resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Backend {
    /// Exec inside the timing daemon pod.
    DaemonExec,
    /// Netlink queries from an ephemeral pod.
    EphemeralNetlink,
    /// Direct filesystem reads.
    Filesystem,
}

/// A named probe and the scope it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe<'a> {
    /// Resolve the hardware clock id behind an interface.
    ClockId { interface: &'a str },
    /// Query DPLL devices over netlink for one clock.
    DpllNetlink { clock_id: ClockId },
    /// Read DPLL state files of an interface.
    DpllFilesystem { interface: &'a str },
    /// Read the GNSS receiver navigation status.
    GnssNav { interface: &'a str },
    /// Read GNSS firmware, protocol and gpsd versions.
    GnssVersions { interface: &'a str },
}

impl Probe<'_> {
    /// Stable probe name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClockId { .. } => "clock-id",
            Self::DpllNetlink { .. } => "dpll-info-nl",
            Self::DpllFilesystem { .. } => "dpll-info-fs",
            Self::GnssNav { .. } => "gpsNav",
            Self::GnssVersions { .. } => "gnss-versions",
        }
    }

    pub(crate) fn unsupported(&self, backend: Backend) -> ProbeError {
        ProbeError::Unsupported {
            probe: self.name(),
            backend,
        }
    }
}

/// Execution backend owned by a single collector.
#[derive(Debug)]
pub enum Context {
    /// Exec in the timing daemon pod.
    DaemonExec(DaemonExecContext),
    /// Ephemeral netlink pod.
    EphemeralNetlink(NetlinkContext),
    /// Local filesystem.
    Filesystem(FilesystemContext),
}

impl Context {
    /// Resolve a context of the requested backend from the run configuration.
    ///
    /// Cluster-backed contexts need a usable cluster client; the daemon
    /// context additionally locates the daemon pod up front.
    ///
    /// # Errors
    /// Returns `ConfigError::BackendUnavailable` when the cluster client is
    /// missing or cannot locate the daemon pod.
    pub async fn resolve(backend: Backend, config: &RunConfig) -> Result<Self, ConfigError> {
        Self::resolve_parts(backend, &config.fs_root, &config.cluster, config.client()).await
    }

    /// Resolve a context straight from the application configuration.
    ///
    /// Used where no run (and hence no sink) exists, e.g. version checks.
    ///
    /// # Errors
    /// Same as [`Context::resolve`].
    pub async fn resolve_for_app(
        backend: Backend,
        app: &AppConfig,
        client: Option<Arc<dyn ClusterClient>>,
    ) -> Result<Self, ConfigError> {
        Self::resolve_parts(backend, &app.filesystem.root, &app.cluster, client).await
    }

    async fn resolve_parts(
        backend: Backend,
        fs_root: &Path,
        cluster: &ClusterConfig,
        client: Option<Arc<dyn ClusterClient>>,
    ) -> Result<Self, ConfigError> {
        let unavailable = |reason: String| ConfigError::BackendUnavailable {
            backend: backend.to_string(),
            reason,
        };

        match backend {
            Backend::Filesystem => Ok(Self::Filesystem(FilesystemContext::new(fs_root))),
            Backend::DaemonExec => {
                let client =
                    client.ok_or_else(|| unavailable("no cluster client configured".to_string()))?;
                let ctx = DaemonExecContext::locate(client, cluster)
                    .await
                    .map_err(|e| unavailable(e.to_string()))?;
                Ok(Self::DaemonExec(ctx))
            }
            Backend::EphemeralNetlink => {
                let client =
                    client.ok_or_else(|| unavailable("no cluster client configured".to_string()))?;
                Ok(Self::EphemeralNetlink(NetlinkContext::new(client, cluster)))
            }
        }
    }

    /// Backend kind of this context.
    pub fn backend(&self) -> Backend {
        match self {
            Self::DaemonExec(_) => Backend::DaemonExec,
            Self::EphemeralNetlink(_) => Backend::EphemeralNetlink,
            Self::Filesystem(_) => Backend::Filesystem,
        }
    }

    /// Run `probe` and return its raw output.
    ///
    /// # Errors
    /// Returns `ProbeError` if the backend cannot serve the probe or running it fails.
    pub async fn probe(&self, probe: &Probe<'_>) -> Result<Vec<u8>, ProbeError> {
        match self {
            Self::DaemonExec(ctx) => ctx.probe(probe).await,
            Self::EphemeralNetlink(ctx) => ctx.probe(probe).await,
            Self::Filesystem(ctx) => ctx.probe(probe).await,
        }
    }

    /// The netlink context, if this is one.
    pub fn as_netlink(&self) -> Option<&NetlinkContext> {
        match self {
            Self::EphemeralNetlink(ctx) => Some(ctx),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::mock::MockClusterClient;
    use crate::collector::test_support::run_config;

    #[test]
    fn test_backend_display_and_parse() {
        assert_eq!(Backend::DaemonExec.to_string(), "daemon-exec");
        assert_eq!(Backend::EphemeralNetlink.to_string(), "ephemeral-netlink");
        assert_eq!("Filesystem".parse::<Backend>().unwrap(), Backend::Filesystem);
    }

    #[test]
    fn test_probe_names() {
        assert_eq!(Probe::DpllFilesystem { interface: "e" }.name(), "dpll-info-fs");
        assert_eq!(Probe::DpllNetlink { clock_id: ClockId(1) }.name(), "dpll-info-nl");
        assert_eq!(Probe::GnssNav { interface: "e" }.name(), "gpsNav");
    }

    #[tokio::test]
    async fn test_resolve_without_client_fails() {
        let config = run_config(None);
        for backend in [Backend::DaemonExec, Backend::EphemeralNetlink] {
            let err = Context::resolve(backend, &config).await.unwrap_err();
            assert!(matches!(err, ConfigError::BackendUnavailable { .. }));
        }
    }

    #[tokio::test]
    async fn test_resolve_filesystem_needs_no_client() {
        let config = run_config(None);
        let ctx = Context::resolve(Backend::Filesystem, &config).await.unwrap();
        assert_eq!(ctx.backend(), Backend::Filesystem);
        assert!(ctx.as_netlink().is_none());
    }

    #[tokio::test]
    async fn test_resolve_for_app_without_run() {
        let app = AppConfig::from_yaml("collectors:\n  GNSS:\n    interface: ens7f0\n").unwrap();
        let ctx = Context::resolve_for_app(
            Backend::DaemonExec,
            &app,
            Some(Arc::new(MockClusterClient::new())),
        )
        .await
        .unwrap();
        assert_eq!(ctx.backend(), Backend::DaemonExec);

        let err = Context::resolve_for_app(Backend::DaemonExec, &app, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_resolve_daemon_pod_missing() {
        let client = MockClusterClient {
            daemon_pod: None,
            ..MockClusterClient::new()
        };
        let config = run_config(Some(Arc::new(client)));
        let err = Context::resolve(Backend::DaemonExec, &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("daemon-exec backend unavailable"));
    }

    #[tokio::test]
    async fn test_resolve_daemon_and_netlink() {
        let config = run_config(Some(Arc::new(MockClusterClient::new())));
        let ctx = Context::resolve(Backend::DaemonExec, &config).await.unwrap();
        assert_eq!(ctx.backend(), Backend::DaemonExec);

        let ctx = Context::resolve(Backend::EphemeralNetlink, &config)
            .await
            .unwrap();
        assert!(ctx.as_netlink().is_some());
    }
}

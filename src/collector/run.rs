//! Per-run configuration handed to collector factories.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::ClusterClient;
use crate::config::{AppConfig, ClusterConfig, CollectorArgs, CollectorsConfig, ConfigError};
use crate::sink::Callback;

use super::traits::clamp_interval;

/// Everything a factory needs to construct its collector.
#[derive(Clone)]
pub struct RunConfig {
    /// Poll interval, clamped to the minimum.
    pub poll_interval: Duration,
    /// Root for filesystem probes.
    pub fs_root: PathBuf,
    /// Cluster settings for cluster-backed contexts.
    pub cluster: ClusterConfig,
    collectors: CollectorsConfig,
    sink: Arc<dyn Callback>,
    client: Option<Arc<dyn ClusterClient>>,
}

impl RunConfig {
    /// Run configuration with default settings and no cluster client.
    pub fn new(poll_interval: Duration, collectors: CollectorsConfig, sink: Arc<dyn Callback>) -> Self {
        Self {
            poll_interval: clamp_interval(poll_interval),
            fs_root: PathBuf::from("/"),
            cluster: ClusterConfig::default(),
            collectors,
            sink,
            client: None,
        }
    }

    /// Run configuration derived from the loaded application config.
    pub fn from_app(app: &AppConfig, sink: Arc<dyn Callback>) -> Self {
        Self::new(app.interval, app.collectors().clone(), sink)
            .with_fs_root(app.filesystem.root.clone())
            .with_cluster(app.cluster.clone())
    }

    /// Attach the cluster client used by cluster-backed contexts.
    pub fn with_client(mut self, client: Arc<dyn ClusterClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the filesystem root.
    pub fn with_fs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.fs_root = root.into();
        self
    }

    /// Set the cluster settings.
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    /// Cluster client, if one is configured.
    pub fn client(&self) -> Option<Arc<dyn ClusterClient>> {
        self.client.clone()
    }

    /// Shared record sink.
    pub fn sink(&self) -> Arc<dyn Callback> {
        Arc::clone(&self.sink)
    }

    /// Typed arguments configured for `collector`.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if none are configured.
    pub fn args(&self, collector: &str) -> Result<&CollectorArgs, ConfigError> {
        self.collectors.get(collector).ok_or_else(|| {
            ConfigError::ValidationError(format!("no arguments configured for collector '{collector}'"))
        })
    }
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("poll_interval", &self.poll_interval)
            .field("fs_root", &self.fs_root)
            .field("collectors", &self.collectors)
            .field("has_client", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::test_support::RecordingSink;
    use crate::config::{DPLL_COLLECTOR, DpllArgs};

    #[test]
    fn test_interval_clamped() {
        let config = RunConfig::new(
            Duration::from_millis(10),
            CollectorsConfig::default(),
            Arc::new(RecordingSink::default()),
        );
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_args_lookup() {
        let collectors = CollectorsConfig::default().with(
            DPLL_COLLECTOR,
            CollectorArgs::Dpll(DpllArgs {
                interface: "ens7f0".to_string(),
            }),
        );
        let config = RunConfig::new(
            Duration::from_secs(1),
            collectors,
            Arc::new(RecordingSink::default()),
        );
        assert_eq!(config.args(DPLL_COLLECTOR).unwrap().interface(), "ens7f0");
        let err = config.args("GNSS").unwrap_err();
        assert!(err.to_string().contains("no arguments configured for collector 'GNSS'"));
    }

    #[test]
    fn test_from_app() {
        let app = AppConfig::from_yaml(
            "interval: 5s\nfilesystem:\n  root: /host\ncollectors:\n  DPLL:\n    interface: ens7f0\n",
        )
        .unwrap();
        let config = RunConfig::from_app(&app, Arc::new(RecordingSink::default()));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.fs_root, PathBuf::from("/host"));
        assert!(config.client().is_none());
    }
}

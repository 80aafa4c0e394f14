//! DPLL collectors.
//!
//! - [`DpllFilesystemCollector`]: reads sysfs state files, no cluster access
//! - [`DpllNetlinkCollector`]: queries netlink from an ephemeral pod
//!
//! [`DpllFactory`] picks one per run: the filesystem variant whenever the
//! driver exposes its DPLL files, netlink otherwise.

mod filesystem;
mod netlink;

use std::sync::Arc;

pub use filesystem::{DPLL_FS_KEY, DpllFilesystemCollector};
pub use netlink::{DPLL_NL_KEY, DpllNetlinkCollector};

use crate::config::{CollectorArgs, ConfigError, DPLL_COLLECTOR};
use crate::context::{Backend, Context, FilesystemContext};

use super::{Collector, CollectorError, CollectorFactory, RunConfig};

/// Builds the DPLL collector, selecting its backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct DpllFactory;

#[async_trait::async_trait]
impl CollectorFactory for DpllFactory {
    async fn build(&self, config: &RunConfig) -> Result<Arc<dyn Collector>, CollectorError> {
        let interface = match config.args(DPLL_COLLECTOR)? {
            CollectorArgs::Dpll(args) => args.interface.clone(),
            _ => {
                return Err(ConfigError::InvalidArgument {
                    collector: DPLL_COLLECTOR.to_string(),
                    key: "interface".to_string(),
                    expected: "DPLL arguments",
                }
                .into());
            }
        };

        let presence = FilesystemContext::new(config.fs_root.clone());
        let backend = match presence.dpll_present(&interface).await {
            Ok(true) => Backend::Filesystem,
            Ok(false) => {
                tracing::debug!(%interface, "DPLL files absent, using netlink");
                Backend::EphemeralNetlink
            }
            Err(e) => {
                tracing::warn!(%interface, error = %e, "DPLL presence check failed, using netlink");
                Backend::EphemeralNetlink
            }
        };
        tracing::info!(collector = DPLL_COLLECTOR, %interface, %backend, "Selected DPLL backend");

        let collector: Arc<dyn Collector> = match Context::resolve(backend, config).await? {
            Context::Filesystem(ctx) => {
                Arc::new(DpllFilesystemCollector::new(ctx, interface, config.sink()))
            }
            Context::EphemeralNetlink(ctx) => {
                Arc::new(DpllNetlinkCollector::new(ctx, interface, config.sink()))
            }
            other => {
                return Err(CollectorError::BackendUnavailable(format!(
                    "DPLL cannot run on the {} backend",
                    other.backend()
                )));
            }
        };
        Ok(collector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::mock::MockClusterClient;
    use crate::collector::test_support::{run_config, write_dpll_files};

    #[tokio::test]
    async fn test_filesystem_selected_when_present() {
        let dir = tempfile::tempdir().unwrap();
        write_dpll_files(dir.path(), "ens7f0", 3, 3, 0);
        let config = run_config(None).with_fs_root(dir.path());

        let collector = DpllFactory.build(&config).await.unwrap();
        assert_eq!(collector.backend(), Backend::Filesystem);
        assert_eq!(collector.name(), DPLL_COLLECTOR);
    }

    #[tokio::test]
    async fn test_netlink_selected_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(Some(Arc::new(MockClusterClient::new()))).with_fs_root(dir.path());

        let collector = DpllFactory.build(&config).await.unwrap();
        assert_eq!(collector.backend(), Backend::EphemeralNetlink);
    }

    #[tokio::test]
    async fn test_netlink_selected_when_presence_check_errors() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = run_config(Some(Arc::new(MockClusterClient::new()))).with_fs_root(file.path());

        let collector = DpllFactory.build(&config).await.unwrap();
        assert_eq!(collector.backend(), Backend::EphemeralNetlink);
    }

    #[tokio::test]
    async fn test_netlink_without_client_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(None).with_fs_root(dir.path());

        let err = DpllFactory.build(&config).await.err().expect("build should fail");
        assert!(matches!(
            err,
            CollectorError::Config(ConfigError::BackendUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_args_is_config_error() {
        let config = crate::collector::test_support::run_config_with(
            crate::config::CollectorsConfig::default(),
            None,
        );
        let err = DpllFactory.build(&config).await.err().expect("build should fail");
        assert!(matches!(err, CollectorError::Config(_)));
    }
}

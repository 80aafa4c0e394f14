//! GNSS navigation status collector.

use std::sync::{Arc, OnceLock};

use crate::collector::base::CollectorBase;
use crate::collector::{Collector, CollectorError, CollectorFactory, GNSS_COLLECTOR, RunConfig};
use crate::config::{CollectorArgs, ConfigError};
use crate::context::{Backend, Context, DaemonExecContext};
use crate::device::{DeviceRecord, GnssNavFetcher};
use crate::sink::Callback;

/// Sink key for GNSS navigation records.
pub const GNSS_NAV_KEY: &str = "gpsNav";

/// Polls UBX-NAV-STATUS through the timing daemon.
#[derive(Debug)]
pub struct GnssCollector {
    base: CollectorBase,
    interface: String,
    fetcher: OnceLock<GnssNavFetcher>,
}

impl GnssCollector {
    /// Create a collector for the receiver attached to `interface`.
    pub fn new(ctx: DaemonExecContext, interface: impl Into<String>, callback: Arc<dyn Callback>) -> Self {
        Self {
            base: CollectorBase::new(GNSS_COLLECTOR, Context::DaemonExec(ctx), callback),
            interface: interface.into(),
            fetcher: OnceLock::new(),
        }
    }
}

#[async_trait::async_trait]
impl Collector for GnssCollector {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn backend(&self) -> Backend {
        Backend::DaemonExec
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    async fn start(&self) -> Result<(), CollectorError> {
        if self.base.is_running() {
            return Ok(());
        }
        self.fetcher.get_or_init(|| GnssNavFetcher::new(&self.interface));
        self.base.set_running(true);
        tracing::info!(collector = %self.name(), interface = %self.interface, "Collector started");
        Ok(())
    }

    async fn collect(&self) -> Result<(), CollectorError> {
        let fetcher = self
            .fetcher
            .get()
            .filter(|_| self.base.is_running())
            .ok_or_else(|| CollectorError::BackendUnavailable(format!("{} collector is not running", self.name())))?;
        let nav = fetcher.fetch(self.base.context()).await?;
        self.base.forward(&DeviceRecord::GnssNav(nav), GNSS_NAV_KEY)
    }

    async fn cleanup(&self) -> Result<(), CollectorError> {
        self.base.set_running(false);
        Ok(())
    }
}

/// Builds the GNSS collector on the daemon exec backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct GnssFactory;

#[async_trait::async_trait]
impl CollectorFactory for GnssFactory {
    async fn build(&self, config: &RunConfig) -> Result<Arc<dyn Collector>, CollectorError> {
        let interface = match config.args(GNSS_COLLECTOR)? {
            CollectorArgs::Gnss(args) => args.interface.clone(),
            _ => {
                return Err(ConfigError::InvalidArgument {
                    collector: GNSS_COLLECTOR.to_string(),
                    key: "interface".to_string(),
                    expected: "GNSS arguments",
                }
                .into());
            }
        };

        match Context::resolve(Backend::DaemonExec, config).await? {
            Context::DaemonExec(ctx) => Ok(Arc::new(GnssCollector::new(ctx, interface, config.sink()))),
            other => Err(CollectorError::BackendUnavailable(format!(
                "GNSS cannot run on the {} backend",
                other.backend()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::mock::{Call, MockClusterClient};
    use crate::collector::test_support::{RecordingSink, run_config};

    const NAV_STATUS: &str = "UBX-NAV-STATUS:\n  iTOW 1000 gpsFix 3 flags 0xdd fixStat 0x0\n";

    #[tokio::test]
    async fn test_factory_uses_daemon_pod() {
        let client = Arc::new(MockClusterClient::new().with_output("ubxtool", NAV_STATUS));
        let config = run_config(Some(client.clone()));

        let collector = GnssFactory.build(&config).await.unwrap();
        assert_eq!(collector.backend(), Backend::DaemonExec);
        assert_eq!(collector.name(), GNSS_COLLECTOR);
        assert_eq!(client.calls(), [Call::FindPod]);
    }

    #[tokio::test]
    async fn test_factory_without_client_fails() {
        let err = GnssFactory.build(&run_config(None)).await.err().expect("build should fail");
        assert!(matches!(
            err,
            CollectorError::Config(ConfigError::BackendUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_collect_forwards_nav_status() {
        let client = Arc::new(MockClusterClient::new().with_output("ubxtool", NAV_STATUS));
        let sink = Arc::new(RecordingSink::default());
        let ctx = DaemonExecContext::locate(client, &Default::default()).await.unwrap();
        let collector = GnssCollector::new(ctx, "ens7f0", sink.clone());

        collector.start().await.unwrap();
        collector.collect().await.unwrap();

        let records = sink.records();
        assert_eq!(records[0].0, GNSS_NAV_KEY);
        assert!(matches!(&records[0].1, DeviceRecord::GnssNav(nav) if nav.fix_type == 3 && nav.fix_ok));
    }

    #[tokio::test]
    async fn test_exec_failure_is_probe_error() {
        let client = Arc::new(MockClusterClient {
            fail_exec: true,
            ..MockClusterClient::new()
        });
        let ctx = DaemonExecContext::locate(client, &Default::default()).await.unwrap();
        let collector = GnssCollector::new(ctx, "ens7f0", Arc::new(RecordingSink::default()));

        collector.start().await.unwrap();
        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, CollectorError::Probe(_)));
    }
}

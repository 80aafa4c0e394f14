//! DPLL collector querying netlink from an ephemeral pod.

use std::sync::{Arc, OnceLock};

use crate::collector::base::CollectorBase;
use crate::collector::{Collector, CollectorError, DPLL_COLLECTOR};
use crate::context::{Backend, Context, NetlinkContext};
use crate::device::{ClockId, DeviceRecord, DpllNetlinkFetcher, fetch_clock_id};
use crate::sink::Callback;

/// Sink key for netlink DPLL records.
pub const DPLL_NL_KEY: &str = "dpll-info-nl";

/// Collects EEC/PPS lock status over netlink.
///
/// Start creates the ephemeral pod, waits for it to be ready and resolves the
/// interface's clock id; cleanup deletes the pod.
#[derive(Debug)]
pub struct DpllNetlinkCollector {
    base: CollectorBase,
    interface: String,
    fetcher: OnceLock<DpllNetlinkFetcher>,
}

impl DpllNetlinkCollector {
    /// Create a collector for `interface`. Nothing is created until start.
    pub fn new(ctx: NetlinkContext, interface: impl Into<String>, callback: Arc<dyn Callback>) -> Self {
        Self {
            base: CollectorBase::new(DPLL_COLLECTOR, Context::EphemeralNetlink(ctx), callback),
            interface: interface.into(),
            fetcher: OnceLock::new(),
        }
    }

    /// Clock id resolved at start.
    pub fn clock_id(&self) -> Option<ClockId> {
        self.fetcher.get().map(DpllNetlinkFetcher::clock_id)
    }

    fn netlink(&self) -> Result<&NetlinkContext, CollectorError> {
        self.base.context().as_netlink().ok_or_else(|| {
            CollectorError::BackendUnavailable(format!("{} collector has no netlink context", self.name()))
        })
    }
}

#[async_trait::async_trait]
impl Collector for DpllNetlinkCollector {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn backend(&self) -> Backend {
        Backend::EphemeralNetlink
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    async fn start(&self) -> Result<(), CollectorError> {
        if self.base.is_running() {
            return Ok(());
        }
        let ctx = self.netlink()?;

        ctx.create_pod_and_wait().await.map_err(|e| {
            CollectorError::BackendUnavailable(format!("netlink pod {} not ready: {e}", ctx.pod()))
        })?;

        let clock_id = fetch_clock_id(self.base.context(), &self.interface)
            .await
            .map_err(|e| {
                CollectorError::BackendUnavailable(format!(
                    "clock id for {} unavailable: {e}",
                    self.interface
                ))
            })?;
        let fetcher = self.fetcher.get_or_init(|| DpllNetlinkFetcher::new(clock_id));

        self.base.set_running(true);
        tracing::info!(
            collector = %self.name(),
            interface = %self.interface,
            clock_id = %fetcher.clock_id(),
            pod = %ctx.pod(),
            "Collector started"
        );
        Ok(())
    }

    async fn collect(&self) -> Result<(), CollectorError> {
        let fetcher = self
            .fetcher
            .get()
            .filter(|_| self.base.is_running())
            .ok_or_else(|| CollectorError::BackendUnavailable(format!("{} collector is not running", self.name())))?;
        let info = fetcher.fetch(self.base.context()).await?;
        self.base.forward(&DeviceRecord::DpllNetlink(info), DPLL_NL_KEY)
    }

    async fn cleanup(&self) -> Result<(), CollectorError> {
        self.base.set_running(false);
        let ctx = self.netlink()?;
        ctx.delete_pod_and_wait()
            .await
            .map_err(|e| CollectorError::Cleanup(format!("netlink pod {}: {e}", ctx.pod())))?;
        tracing::info!(collector = %self.name(), pod = %ctx.pod(), "Netlink pod removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::mock::{Call, MockClusterClient};
    use crate::collector::test_support::RecordingSink;
    use crate::config::ClusterConfig;

    const DUMP: &str = r#"[
        {"id": 0, "clock-id": 42, "type": "eec", "lock-status": "locked-ho-acq"},
        {"id": 1, "clock-id": 42, "type": "pps", "lock-status": "locked"}
    ]"#;

    fn collector(client: MockClusterClient) -> (Arc<MockClusterClient>, Arc<RecordingSink>, DpllNetlinkCollector) {
        let client = Arc::new(client);
        let sink = Arc::new(RecordingSink::default());
        let ctx = NetlinkContext::new(client.clone(), &ClusterConfig::default());
        let collector = DpllNetlinkCollector::new(ctx, "ens7f0", sink.clone());
        (client, sink, collector)
    }

    #[tokio::test]
    async fn test_start_creates_pod_and_resolves_clock() {
        let (client, sink, collector) = collector(
            MockClusterClient::new()
                .with_output("sh", "00-00-00-00-00-00-00-2a\n")
                .with_output("ynl", DUMP),
        );

        collector.start().await.unwrap();
        assert!(collector.is_running());
        assert_eq!(collector.clock_id(), Some(ClockId(42)));

        collector.collect().await.unwrap();
        assert_eq!(sink.records()[0].0, DPLL_NL_KEY);

        collector.cleanup().await.unwrap();
        assert!(!collector.is_running());

        let calls = client.calls();
        assert_eq!(calls[0], Call::Create("dpll-netlink".to_string()));
        assert_eq!(calls[1], Call::WaitReady("dpll-netlink".to_string()));
        assert_eq!(
            &calls[calls.len() - 2..],
            [
                Call::Delete("dpll-netlink".to_string()),
                Call::WaitGone("dpll-netlink".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (client, _sink, collector) =
            collector(MockClusterClient::new().with_output("sh", "42"));
        collector.start().await.unwrap();
        collector.start().await.unwrap();
        let creates = client
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_ready_timeout_fails_start_but_cleanup_deletes() {
        let (client, _sink, collector) = collector(MockClusterClient {
            fail_ready: true,
            ..MockClusterClient::new()
        });

        let err = collector.start().await.unwrap_err();
        assert!(matches!(err, CollectorError::BackendUnavailable(_)));
        assert!(!collector.is_running());

        collector.cleanup().await.unwrap();
        assert!(client.calls().contains(&Call::Delete("dpll-netlink".to_string())));
    }

    #[tokio::test]
    async fn test_cleanup_without_start_is_noop() {
        let (client, _sink, collector) = collector(MockClusterClient::new());
        collector.cleanup().await.unwrap();
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_is_cleanup_error() {
        let (_client, _sink, collector) = collector(MockClusterClient {
            fail_delete: true,
            ..MockClusterClient::new().with_output("sh", "42")
        });
        collector.start().await.unwrap();
        let err = collector.cleanup().await.unwrap_err();
        assert!(matches!(err, CollectorError::Cleanup(_)));
    }
}

//! DPLL collector reading sysfs state files.

use std::sync::{Arc, OnceLock};

use crate::collector::base::CollectorBase;
use crate::collector::{Collector, CollectorError, DPLL_COLLECTOR};
use crate::context::{Backend, Context, FilesystemContext};
use crate::device::{DeviceRecord, DpllFilesystemFetcher};
use crate::sink::Callback;

/// Sink key for filesystem DPLL records.
pub const DPLL_FS_KEY: &str = "dpll-info-fs";

/// Collects EEC/PPS state from the NIC driver's sysfs files.
#[derive(Debug)]
pub struct DpllFilesystemCollector {
    base: CollectorBase,
    interface: String,
    fetcher: OnceLock<DpllFilesystemFetcher>,
}

impl DpllFilesystemCollector {
    /// Create a collector for `interface`.
    pub fn new(ctx: FilesystemContext, interface: impl Into<String>, callback: Arc<dyn Callback>) -> Self {
        Self {
            base: CollectorBase::new(DPLL_COLLECTOR, Context::Filesystem(ctx), callback),
            interface: interface.into(),
            fetcher: OnceLock::new(),
        }
    }

    /// Interface whose DPLL is observed.
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

#[async_trait::async_trait]
impl Collector for DpllFilesystemCollector {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn backend(&self) -> Backend {
        Backend::Filesystem
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    async fn start(&self) -> Result<(), CollectorError> {
        if self.base.is_running() {
            return Ok(());
        }
        self.fetcher
            .get_or_init(|| DpllFilesystemFetcher::new(&self.interface));
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
        let info = fetcher.fetch(self.base.context()).await?;
        self.base.forward(&DeviceRecord::DpllFilesystem(info), DPLL_FS_KEY)
    }

    async fn cleanup(&self) -> Result<(), CollectorError> {
        self.base.set_running(false);
        Ok(())
    }
}

//! State shared by every concrete collector.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::Context;
use crate::device::DeviceRecord;
use crate::sink::Callback;

use super::traits::CollectorError;

/// Name, context, running flag and sink of one collector.
pub(crate) struct CollectorBase {
    name: &'static str,
    context: Context,
    callback: Arc<dyn Callback>,
    running: AtomicBool,
}

impl CollectorBase {
    pub(crate) fn new(name: &'static str, context: Context, callback: Arc<dyn Callback>) -> Self {
        Self {
            name,
            context,
            callback,
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Hand a decoded record to the sink under `key`.
    pub(crate) fn forward(&self, record: &DeviceRecord, key: &str) -> Result<(), CollectorError> {
        self.callback.call(record, key).inspect_err(|e| {
            tracing::warn!(collector = %self.name, key, error = %e, "Sink rejected record");
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for CollectorBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorBase")
            .field("name", &self.name)
            .field("backend", &self.context.backend())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

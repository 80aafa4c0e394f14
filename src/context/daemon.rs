//! Exec inside the long-lived timing daemon pod.

use std::sync::Arc;

use crate::cluster::{ClusterClient, ClusterError, PodRef};
use crate::config::ClusterConfig;

use super::{Backend, Probe, ProbeError};

/// ubxtool protocol version used for every query.
const UBX_PROTOCOL: &str = "29.20";

/// Context running probes in the timing daemon's container.
///
/// The pod is owned by the cluster, not by the collector: there is nothing to
/// create or delete.
pub struct DaemonExecContext {
    client: Arc<dyn ClusterClient>,
    pod: PodRef,
}

impl DaemonExecContext {
    /// Locate the daemon pod using the configured namespace and selector.
    ///
    /// # Errors
    /// Returns `ClusterError` if no matching pod is running.
    pub async fn locate(
        client: Arc<dyn ClusterClient>,
        cluster: &ClusterConfig,
    ) -> Result<Self, ClusterError> {
        let name = client
            .find_pod(&cluster.namespace, &cluster.daemon_selector)
            .await?;
        let pod = PodRef::new(&cluster.namespace, name, &cluster.daemon_container);
        tracing::debug!(pod = %pod, "Located timing daemon pod");
        Ok(Self { client, pod })
    }

    /// The daemon pod probes run in.
    pub fn pod(&self) -> &PodRef {
        &self.pod
    }

    pub(super) async fn probe(&self, probe: &Probe<'_>) -> Result<Vec<u8>, ProbeError> {
        let output = match probe {
            Probe::GnssNav { .. } => {
                self.client
                    .exec(
                        &self.pod,
                        &["ubxtool", "-t", "-w", "3", "-p", "NAV-STATUS", "-P", UBX_PROTOCOL],
                    )
                    .await?
            }
            Probe::GnssVersions { .. } => {
                let script = format!("ubxtool -t -w 3 -p MON-VER -P {UBX_PROTOCOL}; gpsd --version");
                self.client
                    .exec(&self.pod, &["sh", "-c", script.as_str()])
                    .await?
            }
            other => return Err(other.unsupported(Backend::DaemonExec)),
        };
        Ok(output)
    }
}

impl std::fmt::Debug for DaemonExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonExecContext")
            .field("pod", &self.pod)
            .finish_non_exhaustive()
    }
}

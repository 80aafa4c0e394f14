//! Ephemeral pod running netlink queries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::cluster::{ClusterClient, ClusterError, PodRef, PodSpec};
use crate::config::ClusterConfig;

use super::{Backend, Probe, ProbeError};

/// Container name inside the ephemeral pod.
const NETLINK_CONTAINER: &str = "netlink";

/// Prints the PCI serial number of the device behind interface `$1`.
const CLOCK_ID_SCRIPT: &str = r#"lspci -vv -s "$(basename "$(readlink -f "/sys/class/net/$1/device")")" | awk '/Device Serial Number/ {print $NF}'"#;

/// Context owning a short-lived privileged pod.
///
/// The pod exists only between [`NetlinkContext::create_pod_and_wait`] and
/// [`NetlinkContext::delete_pod_and_wait`], which the owning collector calls
/// from its start and cleanup.
pub struct NetlinkContext {
    client: Arc<dyn ClusterClient>,
    spec: PodSpec,
    ready_timeout: Duration,
    delete_timeout: Duration,
    created: AtomicBool,
}

impl NetlinkContext {
    /// Prepare (but do not create) the ephemeral pod.
    pub fn new(client: Arc<dyn ClusterClient>, cluster: &ClusterConfig) -> Self {
        let name = match &cluster.node_name {
            Some(node) => format!("dpll-netlink-{node}"),
            None => "dpll-netlink".to_string(),
        };
        let spec = PodSpec {
            pod: PodRef::new(&cluster.namespace, name, NETLINK_CONTAINER),
            image: cluster.netlink_image.clone(),
            node_name: cluster.node_name.clone(),
        };

        Self {
            client,
            spec,
            ready_timeout: cluster.ready_timeout,
            delete_timeout: cluster.delete_timeout,
            created: AtomicBool::new(false),
        }
    }

    /// The ephemeral pod.
    pub fn pod(&self) -> &PodRef {
        &self.spec.pod
    }

    /// Whether a create has been attempted and not yet cleaned up.
    pub fn is_created(&self) -> bool {
        self.created.load(Ordering::Acquire)
    }

    /// Create the pod and block until it is ready or the wait bound elapses.
    ///
    /// The pod is marked as owned before the create call, so a failure midway
    /// still leaves it eligible for deletion.
    ///
    /// # Errors
    /// Returns `ClusterError` if creation fails or readiness is not reached in time.
    pub async fn create_pod_and_wait(&self) -> Result<(), ClusterError> {
        if self.created.swap(true, Ordering::AcqRel) {
            tracing::debug!(pod = %self.spec.pod, "Pod already created, skipping");
            return Ok(());
        }
        self.client.create_pod(&self.spec).await?;
        self.client
            .wait_pod_ready(&self.spec.pod, self.ready_timeout)
            .await
    }

    /// Delete the pod and block until it is gone or the wait bound elapses.
    ///
    /// Does nothing when no create was attempted.
    ///
    /// # Errors
    /// Returns `ClusterError` if deletion fails or the pod outlives the wait.
    pub async fn delete_pod_and_wait(&self) -> Result<(), ClusterError> {
        if !self.created.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.client.delete_pod(&self.spec.pod).await?;
        self.client
            .wait_pod_gone(&self.spec.pod, self.delete_timeout)
            .await
    }

    pub(super) async fn probe(&self, probe: &Probe<'_>) -> Result<Vec<u8>, ProbeError> {
        let output = match probe {
            Probe::ClockId { interface } => {
                // The DPLL clock id is the NIC's PCI device serial number.
                // The interface is passed as `$1`, never spliced into the script.
                self.client
                    .exec(
                        &self.spec.pod,
                        &["sh", "-c", CLOCK_ID_SCRIPT, "sh", *interface],
                    )
                    .await?
            }
            Probe::DpllNetlink { .. } => {
                self.client
                    .exec(
                        &self.spec.pod,
                        &["ynl", "--family", "dpll", "--dump", "device-get", "--output-json"],
                    )
                    .await?
            }
            other => return Err(other.unsupported(Backend::EphemeralNetlink)),
        };
        Ok(output)
    }
}

impl std::fmt::Debug for NetlinkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetlinkContext")
            .field("pod", &self.spec.pod)
            .field("created", &self.is_created())
            .finish_non_exhaustive()
    }
}

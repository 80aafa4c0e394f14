//! Cluster access layer.
//!
//! Collectors never talk to the cluster directly. They go through a shared
//! [`ClusterClient`] handle, which must be safe to use from several collector
//! tasks at once.
//!
//! - [`ClusterClient`]: pod lookup, exec, and ephemeral pod lifecycle
//! - [`KubectlClient`]: implementation backed by the `kubectl` binary

mod kubectl;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use kubectl::KubectlClient;

/// Errors returned by a [`ClusterClient`].
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Spawning or talking to the client process failed.
    #[error("cluster client I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cluster rejected or failed a command.
    #[error("cluster command `{command}` failed: {stderr}")]
    Command {
        /// Short description of the command.
        command: String,
        /// Trimmed stderr output.
        stderr: String,
    },

    /// No pod matched the lookup.
    #[error("no pod matching '{selector}' in namespace '{namespace}'")]
    PodNotFound {
        /// Namespace searched.
        namespace: String,
        /// Label selector used.
        selector: String,
    },

    /// A bounded wait elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Manifest serialization failed.
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Reference to a pod and the container probes run in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    /// Pod namespace.
    pub namespace: String,
    /// Pod name.
    pub name: String,
    /// Container to exec into.
    pub container: String,
}

impl PodRef {
    /// Create a new pod reference.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            container: container.into(),
        }
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.name, self.container)
    }
}

/// Definition of a privileged, host-networked pod used for netlink probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSpec {
    /// Where the pod will live once created.
    pub pod: PodRef,
    /// Container image.
    pub image: String,
    /// Node to pin the pod to.
    pub node_name: Option<String>,
}

impl PodSpec {
    /// Render the pod as a Kubernetes manifest.
    pub fn to_manifest(&self) -> serde_json::Value {
        let mut spec = serde_json::json!({
            "hostNetwork": true,
            "restartPolicy": "Never",
            "containers": [{
                "name": self.pod.container,
                "image": self.image,
                "command": ["sleep", "infinity"],
                "securityContext": {
                    "privileged": true,
                    "capabilities": { "add": ["NET_ADMIN", "SYS_ADMIN"] }
                }
            }]
        });
        if let Some(node) = &self.node_name {
            spec["nodeName"] = serde_json::json!(node);
        }

        serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": self.pod.name,
                "namespace": self.pod.namespace,
                "labels": { "app.kubernetes.io/managed-by": "timing-collector" }
            },
            "spec": spec
        })
    }
}

/// Operations the collectors need from the cluster.
///
/// Implementations must be internally synchronized: one handle is shared by
/// every collector and called concurrently during a tick.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Find the first running pod matching `selector` in `namespace`.
    async fn find_pod(&self, namespace: &str, selector: &str) -> Result<String, ClusterError>;

    /// Run `command` inside the pod's container and return its stdout.
    async fn exec(&self, pod: &PodRef, command: &[&str]) -> Result<Vec<u8>, ClusterError>;

    /// Create a pod.
    async fn create_pod(&self, spec: &PodSpec) -> Result<(), ClusterError>;

    /// Wait until the pod reports ready, at most `timeout`.
    async fn wait_pod_ready(&self, pod: &PodRef, timeout: Duration) -> Result<(), ClusterError>;

    /// Delete a pod. Deleting a missing pod is not an error.
    async fn delete_pod(&self, pod: &PodRef) -> Result<(), ClusterError>;

    /// Wait until the pod no longer exists, at most `timeout`.
    async fn wait_pod_gone(&self, pod: &PodRef, timeout: Duration) -> Result<(), ClusterError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording in-memory cluster client for tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// A call observed by [`MockClusterClient`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        FindPod,
        Exec(String),
        Create(String),
        WaitReady(String),
        Delete(String),
        WaitGone(String),
    }

    #[derive(Default)]
    pub struct MockClusterClient {
        pub calls: Mutex<Vec<Call>>,
        /// Canned stdout keyed by the first command word.
        pub outputs: Mutex<HashMap<String, Vec<u8>>>,
        pub daemon_pod: Option<String>,
        pub fail_create: bool,
        pub fail_ready: bool,
        pub fail_delete: bool,
        pub fail_exec: bool,
    }

    impl MockClusterClient {
        pub fn new() -> Self {
            Self {
                daemon_pod: Some("linuxptp-daemon-abcde".to_string()),
                ..Default::default()
            }
        }

        pub fn with_output(self, program: &str, stdout: impl Into<Vec<u8>>) -> Self {
            self.outputs
                .lock()
                .unwrap()
                .insert(program.to_string(), stdout.into());
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn failed(command: &str) -> ClusterError {
        ClusterError::Command {
            command: command.to_string(),
            stderr: "injected failure".to_string(),
        }
    }

    #[async_trait::async_trait]
    impl ClusterClient for MockClusterClient {
        async fn find_pod(&self, namespace: &str, selector: &str) -> Result<String, ClusterError> {
            self.record(Call::FindPod);
            self.daemon_pod.clone().ok_or_else(|| ClusterError::PodNotFound {
                namespace: namespace.to_string(),
                selector: selector.to_string(),
            })
        }

        async fn exec(&self, pod: &PodRef, command: &[&str]) -> Result<Vec<u8>, ClusterError> {
            self.record(Call::Exec(format!("{}:{}", pod.name, command.join(" "))));
            if self.fail_exec {
                return Err(failed("exec"));
            }
            let program = command.first().copied().unwrap_or_default();
            self.outputs
                .lock()
                .unwrap()
                .get(program)
                .cloned()
                .ok_or_else(|| failed(program))
        }

        async fn create_pod(&self, spec: &PodSpec) -> Result<(), ClusterError> {
            self.record(Call::Create(spec.pod.name.clone()));
            if self.fail_create { Err(failed("create")) } else { Ok(()) }
        }

        async fn wait_pod_ready(&self, pod: &PodRef, _timeout: Duration) -> Result<(), ClusterError> {
            self.record(Call::WaitReady(pod.name.clone()));
            if self.fail_ready {
                Err(ClusterError::Timeout(Duration::from_secs(1)))
            } else {
                Ok(())
            }
        }

        async fn delete_pod(&self, pod: &PodRef) -> Result<(), ClusterError> {
            self.record(Call::Delete(pod.name.clone()));
            if self.fail_delete { Err(failed("delete")) } else { Ok(()) }
        }

        async fn wait_pod_gone(&self, pod: &PodRef, _timeout: Duration) -> Result<(), ClusterError> {
            self.record(Call::WaitGone(pod.name.clone()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_ref_display() {
        let pod = PodRef::new("openshift-ptp", "linuxptp-daemon-x", "linuxptp-daemon-container");
        assert_eq!(
            pod.to_string(),
            "openshift-ptp/linuxptp-daemon-x[linuxptp-daemon-container]"
        );
    }

    #[test]
    fn test_pod_spec_manifest() {
        let spec = PodSpec {
            pod: PodRef::new("openshift-ptp", "dpll-netlink-worker-0", "netlink"),
            image: "example/netlink:1".to_string(),
            node_name: Some("worker-0".to_string()),
        };
        let manifest = spec.to_manifest();

        assert_eq!(manifest["kind"], "Pod");
        assert_eq!(manifest["metadata"]["name"], "dpll-netlink-worker-0");
        assert_eq!(manifest["metadata"]["namespace"], "openshift-ptp");
        assert_eq!(manifest["spec"]["nodeName"], "worker-0");
        assert_eq!(manifest["spec"]["hostNetwork"], true);
        assert_eq!(manifest["spec"]["containers"][0]["name"], "netlink");
        assert_eq!(manifest["spec"]["containers"][0]["image"], "example/netlink:1");
    }

    #[test]
    fn test_pod_spec_manifest_without_node() {
        let spec = PodSpec {
            pod: PodRef::new("ns", "pod", "c"),
            image: "img".to_string(),
            node_name: None,
        };
        assert!(spec.to_manifest()["spec"].get("nodeName").is_none());
    }
}

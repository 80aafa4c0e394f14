//! [`ClusterClient`] backed by the `kubectl` binary.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ClusterClient, ClusterError, PodRef, PodSpec};

/// Bound on a single non-waiting kubectl invocation (30 seconds).
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time granted on top of a `kubectl wait` timeout before the process is killed.
const WAIT_GRACE: Duration = Duration::from_secs(5);

/// Cluster client that shells out to `kubectl`.
///
/// Every invocation is a separate process, so the handle is trivially safe to
/// share between collector tasks.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    program: String,
    kubeconfig: Option<String>,
    node_name: Option<String>,
    command_timeout: Duration,
}

impl KubectlClient {
    /// Create a client invoking `program` (usually `"kubectl"`).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            kubeconfig: None,
            node_name: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use an explicit kubeconfig file.
    pub fn with_kubeconfig(mut self, path: impl Into<String>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Restrict pod lookups to pods scheduled on `node`.
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node_name = Some(node.into());
        self
    }

    /// Set the bound on non-waiting invocations.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(
        &self,
        label: &str,
        args: &[&str],
        stdin: Option<Vec<u8>>,
        limit: Duration,
    ) -> Result<Vec<u8>, ClusterError> {
        let mut cmd = self.command(args);
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        tracing::debug!(command = %label, ?args, "Running kubectl");

        let exchange = async {
            let mut child = cmd.spawn()?;
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(&input).await?;
                pipe.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| ClusterError::Timeout(limit))??;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(ClusterError::Command {
                command: label.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn timeout_arg(timeout: Duration) -> String {
    format!("--timeout={}s", timeout.as_secs().max(1))
}

#[async_trait::async_trait]
impl ClusterClient for KubectlClient {
    async fn find_pod(&self, namespace: &str, selector: &str) -> Result<String, ClusterError> {
        let mut fields = "status.phase=Running".to_string();
        if let Some(node) = &self.node_name {
            fields.push_str(&format!(",spec.nodeName={node}"));
        }
        let field_arg = format!("--field-selector={fields}");
        let args = [
            "get",
            "pods",
            "-n",
            namespace,
            "-l",
            selector,
            field_arg.as_str(),
            "-o",
            "jsonpath={.items[0].metadata.name}",
        ];
        let stdout = self
            .run("get pods", &args, None, self.command_timeout)
            .await?;

        let name = String::from_utf8_lossy(&stdout).trim().to_string();
        if name.is_empty() {
            return Err(ClusterError::PodNotFound {
                namespace: namespace.to_string(),
                selector: selector.to_string(),
            });
        }
        Ok(name)
    }

    async fn exec(&self, pod: &PodRef, command: &[&str]) -> Result<Vec<u8>, ClusterError> {
        let mut args = vec![
            "exec",
            "-n",
            pod.namespace.as_str(),
            pod.name.as_str(),
            "-c",
            pod.container.as_str(),
            "--",
        ];
        args.extend_from_slice(command);
        self.run("exec", &args, None, self.command_timeout).await
    }

    async fn create_pod(&self, spec: &PodSpec) -> Result<(), ClusterError> {
        let manifest = serde_json::to_vec(&spec.to_manifest())?;
        self.run(
            "apply pod",
            &["apply", "-f", "-"],
            Some(manifest),
            self.command_timeout,
        )
        .await?;
        tracing::info!(pod = %spec.pod, "Pod created");
        Ok(())
    }

    async fn wait_pod_ready(&self, pod: &PodRef, timeout: Duration) -> Result<(), ClusterError> {
        let target = format!("pod/{}", pod.name);
        let timeout_flag = timeout_arg(timeout);
        let args = [
            "wait",
            "--for=condition=Ready",
            target.as_str(),
            "-n",
            pod.namespace.as_str(),
            timeout_flag.as_str(),
        ];
        self.run("wait ready", &args, None, timeout + WAIT_GRACE)
            .await?;
        Ok(())
    }

    async fn delete_pod(&self, pod: &PodRef) -> Result<(), ClusterError> {
        let args = [
            "delete",
            "pod",
            pod.name.as_str(),
            "-n",
            pod.namespace.as_str(),
            "--ignore-not-found",
            "--wait=false",
        ];
        self.run("delete pod", &args, None, self.command_timeout)
            .await?;
        Ok(())
    }

    async fn wait_pod_gone(&self, pod: &PodRef, timeout: Duration) -> Result<(), ClusterError> {
        let target = format!("pod/{}", pod.name);
        let timeout_flag = timeout_arg(timeout);
        let args = [
            "wait",
            "--for=delete",
            target.as_str(),
            "-n",
            pod.namespace.as_str(),
            timeout_flag.as_str(),
        ];
        self.run("wait deleted", &args, None, timeout + WAIT_GRACE)
            .await?;
        tracing::info!(pod = %pod, "Pod deleted");
        Ok(())
    }
}

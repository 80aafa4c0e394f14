//! Direct reads of local sysfs DPLL files.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::{Backend, Probe, ProbeError};

/// DPLL state files exposed by the NIC driver, in output order.
pub const DPLL_FILES: [&str; 3] = ["dpll_0_state", "dpll_1_state", "dpll_1_offset"];

/// Context reading per-interface files under a filesystem root.
#[derive(Debug, Clone)]
pub struct FilesystemContext {
    root: PathBuf,
}

impl FilesystemContext {
    /// Create a context rooted at `root` (normally `/`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Driver directory of `interface`.
    pub fn device_dir(&self, interface: &str) -> PathBuf {
        self.root
            .join("sys/class/net")
            .join(interface)
            .join("device")
    }

    /// Whether the DPLL state files exist for `interface`.
    ///
    /// # Errors
    /// Returns `ProbeError::Io` when existence cannot be determined, e.g. a
    /// permission error or a path component that is not a directory.
    pub async fn dpll_present(&self, interface: &str) -> Result<bool, ProbeError> {
        let path = self.device_dir(interface).join(DPLL_FILES[0]);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| ProbeError::Io { path, source })
    }

    pub(super) async fn probe(&self, probe: &Probe<'_>) -> Result<Vec<u8>, ProbeError> {
        match probe {
            Probe::DpllFilesystem { interface } => self.read_dpll(interface).await,
            other => Err(other.unsupported(Backend::Filesystem)),
        }
    }

    /// Read every DPLL file into `name value` lines.
    async fn read_dpll(&self, interface: &str) -> Result<Vec<u8>, ProbeError> {
        let dir = self.device_dir(interface);
        let mut out = String::new();
        for file in DPLL_FILES {
            let value = read_trimmed(&dir.join(file)).await?;
            let _ = writeln!(out, "{file} {value}");
        }
        Ok(out.into_bytes())
    }
}

async fn read_trimmed(path: &Path) -> Result<String, ProbeError> {
    tokio::fs::read_to_string(path)
        .await
        .map(|s| s.trim().to_string())
        .map_err(|source| ProbeError::Io {
            path: path.to_path_buf(),
            source,
        })
}

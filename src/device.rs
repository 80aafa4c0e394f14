//! Device layer.
//!
//! Turns raw probe output from a [`Context`](crate::context::Context) into
//! typed records. Decoding failures are reported as [`ProbeError::Decode`]
//! and never retried here.
//!
//! - [`dpll`]: DPLL state from sysfs or netlink, and clock id resolution
//! - [`gnss`]: GNSS navigation status and version strings

pub mod dpll;
pub mod gnss;

use serde::{Deserialize, Serialize};

use crate::context::ProbeError;

pub use dpll::{
    DpllDeviceStatus, DpllFilesystemFetcher, DpllFilesystemInfo, DpllNetlinkFetcher,
    DpllNetlinkInfo, fetch_clock_id,
};
pub use gnss::{GnssNav, GnssNavFetcher, GnssVersions, fetch_gnss_versions};

/// Hardware clock identifier of a DPLL-capable NIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClockId(pub u64);

impl ClockId {
    /// Parse probe output into a clock id.
    ///
    /// Accepts a PCI serial number (`50-7c-6f-ff-ff-1f-b5-80`), `0x` hex, or decimal.
    ///
    /// # Errors
    /// Returns `ProbeError::Decode` when the output matches none of those forms.
    pub fn decode(raw: &[u8]) -> Result<Self, ProbeError> {
        const PROBE: &str = "clock-id";
        let text = std::str::from_utf8(raw)
            .map_err(|e| ProbeError::decode(PROBE, e.to_string()))?
            .trim();
        if text.is_empty() {
            return Err(ProbeError::decode(PROBE, "empty output"));
        }

        let parsed = if let Some(hex) = text.strip_prefix("0x") {
            u64::from_str_radix(hex, 16)
        } else if text.contains('-') {
            u64::from_str_radix(&text.replace('-', ""), 16)
        } else {
            text.parse::<u64>()
        };

        parsed
            .map(Self)
            .map_err(|e| ProbeError::decode(PROBE, format!("'{text}': {e}")))
    }
}

impl std::fmt::Display for ClockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Any record a collector hands to the callback sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum DeviceRecord {
    /// DPLL state read from sysfs.
    DpllFilesystem(DpllFilesystemInfo),
    /// DPLL state queried over netlink.
    DpllNetlink(DpllNetlinkInfo),
    /// GNSS navigation status.
    GnssNav(GnssNav),
}

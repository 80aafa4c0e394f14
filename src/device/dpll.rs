//! DPLL records, decoders and fetchers.

use serde::{Deserialize, Serialize};

use crate::context::{Context, Probe, ProbeError};

use super::ClockId;

/// DPLL state as exposed by the NIC driver in sysfs.
///
/// States follow the driver's numbering (e.g. 3 = locked, 4 = holdover).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpllFilesystemInfo {
    /// EEC DPLL state (`dpll_0_state`).
    pub eec_state: i64,
    /// PPS DPLL state (`dpll_1_state`).
    pub pps_state: i64,
    /// PPS phase offset as reported by the driver (`dpll_1_offset`).
    pub pps_offset: i64,
}

impl DpllFilesystemInfo {
    /// Decode `name value` lines produced by the filesystem context.
    ///
    /// # Errors
    /// Returns `ProbeError::Decode` on a missing or non-numeric field.
    pub fn decode(raw: &[u8]) -> Result<Self, ProbeError> {
        const PROBE: &str = "dpll-info-fs";
        let text = String::from_utf8_lossy(raw);
        let field = |name: &str| -> Result<i64, ProbeError> {
            let value = text
                .lines()
                .filter_map(|line| line.split_once(' '))
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.trim())
                .ok_or_else(|| ProbeError::decode(PROBE, format!("missing {name}")))?;
            value
                .parse()
                .map_err(|_| ProbeError::decode(PROBE, format!("{name} is not an integer: '{value}'")))
        };

        Ok(Self {
            eec_state: field("dpll_0_state")?,
            pps_state: field("dpll_1_state")?,
            pps_offset: field("dpll_1_offset")?,
        })
    }
}

/// Status of one DPLL device as reported over netlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpllDeviceStatus {
    /// Netlink device id.
    pub id: u32,
    /// Lock status (e.g. `locked-ho-acq`, `holdover`, `unlocked`).
    pub lock_status: String,
    /// Selection mode, when reported.
    pub mode: Option<String>,
}

/// EEC and PPS DPLL status for one clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpllNetlinkInfo {
    /// Clock the devices belong to.
    pub clock_id: ClockId,
    /// EEC device.
    pub eec: DpllDeviceStatus,
    /// PPS device.
    pub pps: DpllDeviceStatus,
}

/// One entry of a `device-get` dump.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawDevice {
    id: u32,
    clock_id: u64,
    #[serde(rename = "type")]
    kind: String,
    lock_status: String,
    #[serde(default)]
    mode: Option<String>,
}

impl From<RawDevice> for DpllDeviceStatus {
    fn from(raw: RawDevice) -> Self {
        Self {
            id: raw.id,
            lock_status: raw.lock_status,
            mode: raw.mode,
        }
    }
}

impl DpllNetlinkInfo {
    /// Decode a JSON `device-get` dump, keeping the devices of `clock_id`.
    ///
    /// # Errors
    /// Returns `ProbeError::Decode` on malformed JSON or when the clock lacks
    /// an EEC or PPS device.
    pub fn decode(raw: &[u8], clock_id: ClockId) -> Result<Self, ProbeError> {
        const PROBE: &str = "dpll-info-nl";
        let devices: Vec<RawDevice> =
            serde_json::from_slice(raw).map_err(|e| ProbeError::decode(PROBE, e.to_string()))?;

        let mut eec = None;
        let mut pps = None;
        for device in devices.into_iter().filter(|d| d.clock_id == clock_id.0) {
            match device.kind.as_str() {
                "eec" => eec = Some(device.into()),
                "pps" => pps = Some(device.into()),
                _ => {}
            }
        }

        match (eec, pps) {
            (Some(eec), Some(pps)) => Ok(Self { clock_id, eec, pps }),
            (None, _) => Err(ProbeError::decode(PROBE, format!("no eec device for clock {clock_id}"))),
            (_, None) => Err(ProbeError::decode(PROBE, format!("no pps device for clock {clock_id}"))),
        }
    }
}

/// Resolve the clock id behind `interface`.
///
/// # Errors
/// Returns `ProbeError` if the probe fails or its output is not a clock id.
pub async fn fetch_clock_id(ctx: &Context, interface: &str) -> Result<ClockId, ProbeError> {
    let raw = ctx.probe(&Probe::ClockId { interface }).await?;
    ClockId::decode(&raw)
}

/// Fetcher bound to an interface's sysfs DPLL files.
#[derive(Debug, Clone)]
pub struct DpllFilesystemFetcher {
    interface: String,
}

impl DpllFilesystemFetcher {
    /// Bind a fetcher to `interface`.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    /// Probe and decode once.
    pub async fn fetch(&self, ctx: &Context) -> Result<DpllFilesystemInfo, ProbeError> {
        let raw = ctx
            .probe(&Probe::DpllFilesystem {
                interface: &self.interface,
            })
            .await?;
        DpllFilesystemInfo::decode(&raw)
    }
}

/// Fetcher bound to a resolved clock id.
#[derive(Debug, Clone, Copy)]
pub struct DpllNetlinkFetcher {
    clock_id: ClockId,
}

impl DpllNetlinkFetcher {
    /// Bind a fetcher to `clock_id`.
    pub fn new(clock_id: ClockId) -> Self {
        Self { clock_id }
    }

    /// Clock this fetcher queries.
    pub fn clock_id(&self) -> ClockId {
        self.clock_id
    }

    /// Probe and decode once.
    pub async fn fetch(&self, ctx: &Context) -> Result<DpllNetlinkInfo, ProbeError> {
        let raw = ctx
            .probe(&Probe::DpllNetlink {
                clock_id: self.clock_id,
            })
            .await?;
        DpllNetlinkInfo::decode(&raw, self.clock_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"[
        {"id": 0, "clock-id": 5799633565432596096, "type": "eec", "lock-status": "locked-ho-acq", "mode": "automatic", "module-name": "ice"},
        {"id": 1, "clock-id": 5799633565432596096, "type": "pps", "lock-status": "holdover", "module-name": "ice"},
        {"id": 2, "clock-id": 7, "type": "eec", "lock-status": "unlocked"}
    ]"#;

    #[test]
    fn test_decode_filesystem_info() {
        let info =
            DpllFilesystemInfo::decode(b"dpll_0_state 3\ndpll_1_state 4\ndpll_1_offset -120\n")
                .unwrap();
        assert_eq!(
            info,
            DpllFilesystemInfo {
                eec_state: 3,
                pps_state: 4,
                pps_offset: -120,
            }
        );
    }

    #[test]
    fn test_decode_filesystem_info_missing_field() {
        let err = DpllFilesystemInfo::decode(b"dpll_0_state 3\ndpll_1_state 4\n").unwrap_err();
        assert!(err.to_string().contains("missing dpll_1_offset"));
    }

    #[test]
    fn test_decode_filesystem_info_not_numeric() {
        let err =
            DpllFilesystemInfo::decode(b"dpll_0_state locked\ndpll_1_state 4\ndpll_1_offset 0\n")
                .unwrap_err();
        assert!(err.to_string().contains("dpll_0_state is not an integer"));
    }

    #[test]
    fn test_decode_netlink_info_filters_by_clock() {
        let info = DpllNetlinkInfo::decode(DUMP.as_bytes(), ClockId(5799633565432596096)).unwrap();
        assert_eq!(info.eec.id, 0);
        assert_eq!(info.eec.lock_status, "locked-ho-acq");
        assert_eq!(info.eec.mode.as_deref(), Some("automatic"));
        assert_eq!(info.pps.lock_status, "holdover");
        assert!(info.pps.mode.is_none());
    }

    #[test]
    fn test_decode_netlink_info_missing_pps() {
        let err = DpllNetlinkInfo::decode(DUMP.as_bytes(), ClockId(7)).unwrap_err();
        assert!(err.to_string().contains("no pps device"));
    }

    #[test]
    fn test_decode_netlink_info_bad_json() {
        assert!(matches!(
            DpllNetlinkInfo::decode(b"{not json", ClockId(1)),
            Err(ProbeError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_filesystem_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("sys/class/net/ens7f0/device");
        std::fs::create_dir_all(&device).unwrap();
        std::fs::write(device.join("dpll_0_state"), "3\n").unwrap();
        std::fs::write(device.join("dpll_1_state"), "3\n").unwrap();
        std::fs::write(device.join("dpll_1_offset"), "17\n").unwrap();

        let ctx = Context::Filesystem(crate::context::FilesystemContext::new(dir.path()));
        let info = DpllFilesystemFetcher::new("ens7f0").fetch(&ctx).await.unwrap();
        assert_eq!(info.pps_offset, 17);
    }
}

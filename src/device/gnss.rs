//! GNSS receiver records decoded from ubxtool and gpsd output.

use serde::{Deserialize, Serialize};

use crate::context::{Context, Probe, ProbeError};

/// `gpsFixOk` bit of the NAV-STATUS flags.
const FIX_OK_FLAG: u64 = 0x01;

/// Navigation status from a UBX-NAV-STATUS message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GnssNav {
    /// GPS time of week of the navigation epoch, in milliseconds.
    pub itow_ms: u64,
    /// Fix type (0 = no fix, 3 = 3D, 5 = time only).
    pub fix_type: u8,
    /// Whether the fix is within the receiver's accuracy limits.
    pub fix_ok: bool,
    /// Time to first fix in milliseconds, when reported.
    pub ttff_ms: Option<u64>,
    /// Milliseconds since receiver startup, when reported.
    pub msss_ms: Option<u64>,
}

impl GnssNav {
    /// Decode ubxtool text output containing a UBX-NAV-STATUS block.
    ///
    /// # Errors
    /// Returns `ProbeError::Decode` when the block or a required field is absent.
    pub fn decode(raw: &[u8]) -> Result<Self, ProbeError> {
        const PROBE: &str = "gpsNav";
        let text = String::from_utf8_lossy(raw);
        let block = text
            .split_once("UBX-NAV-STATUS:")
            .map(|(_, rest)| rest)
            .ok_or_else(|| ProbeError::decode(PROBE, "no UBX-NAV-STATUS message in output"))?;

        // Fields are `name value` pairs; values may carry a trailing comma.
        let tokens: Vec<&str> = block
            .split_whitespace()
            .take_while(|t| !t.starts_with("UBX-"))
            .map(|t| t.trim_end_matches(','))
            .collect();
        let field = |name: &str| {
            tokens
                .windows(2)
                .find(|pair| pair[0] == name)
                .map(|pair| pair[1])
        };
        let number = |name: &str| -> Result<u64, ProbeError> {
            let value = field(name).ok_or_else(|| ProbeError::decode(PROBE, format!("missing {name}")))?;
            parse_number(value)
                .ok_or_else(|| ProbeError::decode(PROBE, format!("{name} is not a number: '{value}'")))
        };

        let fix_type = u8::try_from(number("gpsFix")?)
            .map_err(|_| ProbeError::decode(PROBE, "gpsFix out of range"))?;

        Ok(Self {
            itow_ms: number("iTOW")?,
            fix_type,
            fix_ok: number("flags")? & FIX_OK_FLAG != 0,
            ttff_ms: field("ttff").and_then(parse_number),
            msss_ms: field("msss").and_then(parse_number),
        })
    }
}

/// Version strings reported by the receiver and gpsd.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GnssVersions {
    /// Firmware version, shaped `"<model> <version>"` (e.g. `"TIM 2.20"`).
    pub firmware_version: String,
    /// UBX protocol version (e.g. `"29.20"`).
    pub proto_version: String,
    /// gpsd version line (e.g. `"3.25~rc1-1ubuntu1 (revision 3.25~rc1-1ubuntu1)"`).
    pub gpsd_version: String,
}

impl GnssVersions {
    /// Decode ubxtool MON-VER output followed by `gpsd --version`.
    ///
    /// # Errors
    /// Returns `ProbeError::Decode` when any of the three versions is absent.
    pub fn decode(raw: &[u8]) -> Result<Self, ProbeError> {
        const PROBE: &str = "gnss-versions";
        let text = String::from_utf8_lossy(raw);
        let find = |marker: &str| -> Result<String, ProbeError> {
            text.lines()
                .find_map(|line| line.split_once(marker).map(|(_, v)| v.trim().to_string()))
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ProbeError::decode(PROBE, format!("no '{}' in output", marker.trim())))
        };

        Ok(Self {
            firmware_version: find("FWVER=")?,
            proto_version: find("PROTVER=")?,
            gpsd_version: find("gpsd: ")?,
        })
    }
}

fn parse_number(value: &str) -> Option<u64> {
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Fetcher bound to the interface a GNSS receiver hangs off.
#[derive(Debug, Clone)]
pub struct GnssNavFetcher {
    interface: String,
}

impl GnssNavFetcher {
    /// Bind a fetcher to `interface`.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    /// Probe and decode once.
    pub async fn fetch(&self, ctx: &Context) -> Result<GnssNav, ProbeError> {
        let raw = ctx
            .probe(&Probe::GnssNav {
                interface: &self.interface,
            })
            .await?;
        GnssNav::decode(&raw)
    }
}

/// Fetch receiver and gpsd versions.
///
/// # Errors
/// Returns `ProbeError` if the probe fails or its output lacks a version.
pub async fn fetch_gnss_versions(ctx: &Context, interface: &str) -> Result<GnssVersions, ProbeError> {
    let raw = ctx.probe(&Probe::GnssVersions { interface }).await?;
    GnssVersions::decode(&raw)
}

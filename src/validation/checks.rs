//! GNSS version checks.

use std::fmt;

use serde::Serialize;

use crate::context::Context;
use crate::device::{GnssVersions, fetch_gnss_versions};

use super::ValidationError;
use super::version::Version;

/// Prefix shared by every version check id.
const VERSION_ID_PREFIX: &str = "tgm/env/version";

/// Minimum receiver firmware version.
pub const GNSS_FIRMWARE_MIN: &str = "2.20";

/// Minimum UBX protocol version.
pub const GNSS_PROTOCOL_MIN: &str = "29.20";

/// Minimum gpsd version.
pub const GPSD_MIN: &str = "3.25";

/// How the comparable version is taken from the observed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionRule {
    /// The n-th whitespace-separated token (`"TIM 2.20"` -> `"2.20"` for n = 1).
    WhitespaceToken(usize),
    /// The first token with `~` turned into `-`
    /// (`"3.25~rc1-1ubuntu1 (revision ...)"` -> `"3.25-rc1-1ubuntu1"`).
    PackageVersion,
    /// The trimmed string as is.
    Raw,
}

impl ExtractionRule {
    /// Apply the rule to `observed`.
    ///
    /// # Errors
    /// Returns `ValidationError::Extraction` when the wanted token is absent.
    pub fn extract(&self, observed: &str) -> Result<String, ValidationError> {
        let extracted = match self {
            Self::WhitespaceToken(n) => observed.split_whitespace().nth(*n).map(str::to_string),
            Self::PackageVersion => observed
                .split_whitespace()
                .next()
                .map(|token| token.replace('~', "-")),
            Self::Raw => Some(observed.trim().to_string()).filter(|s| !s.is_empty()),
        };
        extracted.ok_or_else(|| ValidationError::Extraction {
            observed: observed.to_string(),
            rule: self.to_string(),
        })
    }
}

impl fmt::Display for ExtractionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WhitespaceToken(n) => write!(f, "whitespace token {n}"),
            Self::PackageVersion => f.write_str("package version"),
            Self::Raw => f.write_str("raw"),
        }
    }
}

/// Outcome of comparing one observed version against its minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionCheck {
    /// Check id, e.g. `tgm/env/version/gpsd/`.
    pub id: String,
    /// Human readable description.
    pub description: String,
    /// Version string as reported.
    pub observed: String,
    /// Normalized version that was compared; empty when extraction failed.
    pub comparable: String,
    /// Minimum accepted version.
    pub minimum: String,
    /// Rule used to derive `comparable`.
    pub rule: ExtractionRule,
    /// Whether `comparable >= minimum`.
    pub passed: bool,
    /// Why the check could not be evaluated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VersionCheck {
    /// Evaluate `observed` against `minimum`.
    ///
    /// A version that cannot be extracted or parsed fails the check and the
    /// reason is kept in [`VersionCheck::error`].
    pub fn evaluate(
        name: &str,
        description: &str,
        observed: &str,
        minimum: &str,
        rule: ExtractionRule,
    ) -> Self {
        let mut check = Self {
            id: format!("{VERSION_ID_PREFIX}/{name}/"),
            description: description.to_string(),
            observed: observed.to_string(),
            comparable: String::new(),
            minimum: minimum.to_string(),
            rule,
            passed: false,
            error: None,
        };

        let outcome = rule.extract(observed).and_then(|comparable| {
            check.comparable = comparable;
            let found = Version::parse(&check.comparable)?;
            let min = Version::parse(minimum)?;
            Ok(found.satisfies(&min))
        });
        match outcome {
            Ok(passed) => check.passed = passed,
            Err(e) => {
                tracing::warn!(check = %check.id, error = %e, "Version check could not be evaluated");
                check.error = Some(e.to_string());
            }
        }
        check
    }
}

/// Firmware, protocol and gpsd checks for one receiver.
pub fn gnss_checks(versions: &GnssVersions) -> Vec<VersionCheck> {
    vec![
        VersionCheck::evaluate(
            "gnss-firmware",
            "GNSS firmware version is valid",
            &versions.firmware_version,
            GNSS_FIRMWARE_MIN,
            ExtractionRule::WhitespaceToken(1),
        ),
        VersionCheck::evaluate(
            "gnss-protocol",
            "GNSS protocol version is valid",
            &versions.proto_version,
            GNSS_PROTOCOL_MIN,
            ExtractionRule::Raw,
        ),
        VersionCheck::evaluate(
            "gpsd",
            "GPSD version is valid",
            &versions.gpsd_version,
            GPSD_MIN,
            ExtractionRule::PackageVersion,
        ),
    ]
}

/// Read versions through `ctx` and evaluate every GNSS check.
///
/// # Errors
/// Returns `ValidationError::Probe` if the versions cannot be read.
pub async fn verify_gnss_versions(
    ctx: &Context,
    interface: &str,
) -> Result<Vec<VersionCheck>, ValidationError> {
    let versions = fetch_gnss_versions(ctx, interface).await?;
    tracing::debug!(?versions, "Fetched GNSS versions");
    Ok(gnss_checks(&versions))
}

//! Version compliance checks.
//!
//! Device-reported version strings are normalized by an [`ExtractionRule`]
//! and compared against a minimum with [`Version`] ordering.
//!
//! - [`version`]: dotted/dashed version parsing and ordering
//! - [`checks`]: the GNSS firmware, protocol and gpsd checks

pub mod checks;
pub mod version;

use thiserror::Error;

use crate::context::ProbeError;

pub use checks::{
    ExtractionRule, GNSS_FIRMWARE_MIN, GNSS_PROTOCOL_MIN, GPSD_MIN, VersionCheck, gnss_checks,
    verify_gnss_versions,
};
pub use version::Version;

/// Errors produced while evaluating version checks.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A version string has no numeric leading segment.
    #[error("unparseable version '{0}'")]
    Unparseable(String),

    /// The extraction rule found nothing to compare.
    #[error("cannot extract a version from '{observed}' ({rule})")]
    Extraction {
        /// Observed string.
        observed: String,
        /// Rule that was applied.
        rule: String,
    },

    /// The versions could not be read from the device.
    #[error("failed to read versions: {0}")]
    Probe(#[from] ProbeError),
}

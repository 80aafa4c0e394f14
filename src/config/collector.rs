//! Per-collector argument configuration.
//!
//! The YAML file carries a loose `collector name -> arguments` mapping. It is
//! validated once at load into [`CollectorArgs`], a union with one variant per
//! collector kind, so constructors never see malformed arguments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::validation::ConfigError;

/// Registry name of the DPLL collector.
pub const DPLL_COLLECTOR: &str = "DPLL";

/// Registry name of the GNSS collector.
pub const GNSS_COLLECTOR: &str = "GNSS";

const INTERFACE_KEY: &str = "interface";

/// Linux netdev names: at most 15 bytes, no `/` or whitespace.
fn interface_regex() -> &'static regex::Regex {
    static INTERFACE_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    INTERFACE_REGEX.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9_.:-]{1,15}$").expect("failed to compile interface regex")
    })
}

/// Whether `name` is a usable network interface name.
///
/// The name ends up in sysfs paths and in commands run inside privileged
/// pods, so `.` and `..` are rejected along with anything outside the
/// netdev character set.
pub fn is_valid_interface(name: &str) -> bool {
    name != "." && name != ".." && interface_regex().is_match(name)
}

/// Arguments for the DPLL collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpllArgs {
    /// Network interface whose DPLL is observed (e.g. `ens7f0`).
    pub interface: String,
}

/// Arguments for the GNSS collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GnssArgs {
    /// Network interface the GNSS receiver is attached to.
    pub interface: String,
}

/// Validated arguments, one variant per collector kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CollectorArgs {
    /// DPLL collector arguments.
    Dpll(DpllArgs),
    /// GNSS collector arguments.
    Gnss(GnssArgs),
}

impl CollectorArgs {
    /// Interface name shared by every collector kind.
    pub fn interface(&self) -> &str {
        match self {
            Self::Dpll(args) => &args.interface,
            Self::Gnss(args) => &args.interface,
        }
    }
}

/// Collector argument bags exactly as they appear in the YAML file.
pub type RawCollectorsConfig = BTreeMap<String, serde_yaml::Value>;

/// Validated collector arguments keyed by collector name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectorsConfig {
    args: BTreeMap<String, CollectorArgs>,
}

impl CollectorsConfig {
    /// Validate raw argument bags into typed arguments.
    ///
    /// # Errors
    /// Returns a `ConfigError` naming the collector and key that is unknown,
    /// missing or mistyped.
    pub fn from_raw(raw: &RawCollectorsConfig) -> Result<Self, ConfigError> {
        let mut args = BTreeMap::new();
        for (name, value) in raw {
            let parsed = match name.as_str() {
                DPLL_COLLECTOR => CollectorArgs::Dpll(DpllArgs {
                    interface: required_interface(name, value)?,
                }),
                GNSS_COLLECTOR => CollectorArgs::Gnss(GnssArgs {
                    interface: required_interface(name, value)?,
                }),
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "unknown collector '{}', expected one of: {}, {}",
                        other, DPLL_COLLECTOR, GNSS_COLLECTOR
                    )));
                }
            };
            args.insert(name.clone(), parsed);
        }
        Ok(Self { args })
    }

    /// Insert arguments for a collector, replacing any previous entry.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, args: CollectorArgs) -> Self {
        self.args.insert(name.into(), args);
        self
    }

    /// Arguments configured for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&CollectorArgs> {
        self.args.get(name)
    }

    /// Whether no collector has arguments.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Iterate configured collector names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args.keys().map(String::as_str)
    }
}

fn required_interface(collector: &str, bag: &serde_yaml::Value) -> Result<String, ConfigError> {
    let interface = required_string(collector, bag, INTERFACE_KEY)?;
    if !is_valid_interface(&interface) {
        return Err(ConfigError::InvalidArgument {
            collector: collector.to_string(),
            key: INTERFACE_KEY.to_string(),
            expected: "a network interface name (1-15 of [A-Za-z0-9_.:-])",
        });
    }
    Ok(interface)
}

fn required_string(
    collector: &str,
    bag: &serde_yaml::Value,
    key: &str,
) -> Result<String, ConfigError> {
    let value = bag
        .as_mapping()
        .and_then(|m| m.get(key))
        .ok_or_else(|| ConfigError::MissingArgument {
            collector: collector.to_string(),
            key: key.to_string(),
        })?;

    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(ConfigError::InvalidArgument {
            collector: collector.to_string(),
            key: key.to_string(),
            expected: "a non-empty string",
        }),
    }
}

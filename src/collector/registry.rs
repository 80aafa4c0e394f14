//! Collector registry.
//!
//! The registry is an ordered, duplicate-free list of collector factories
//! assembled once at startup. It holds no collector instances; the
//! orchestrator builds those from it per run.

use std::collections::HashSet;
use std::sync::Arc;

use strum_macros::{AsRefStr, Display, EnumString};

use super::run::RunConfig;
use super::traits::{Collector, CollectorError};

/// Whether a collector's construction or start failure aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Requirement {
    /// Failure aborts the run.
    Required,
    /// Failure drops the collector and the run continues.
    Optional,
}

/// Builds a collector instance for one run.
#[async_trait::async_trait]
pub trait CollectorFactory: Send + Sync + 'static {
    /// Construct the collector, resolving its backend from `config`.
    async fn build(&self, config: &RunConfig) -> Result<Arc<dyn Collector>, CollectorError>;
}

/// One registered collector.
#[derive(Clone)]
pub struct CollectorSpec {
    name: String,
    factory: Arc<dyn CollectorFactory>,
    requirement: Requirement,
}

impl CollectorSpec {
    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requirement class.
    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    /// Factory for the collector.
    pub fn factory(&self) -> &Arc<dyn CollectorFactory> {
        &self.factory
    }
}

impl std::fmt::Debug for CollectorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorSpec")
            .field("name", &self.name)
            .field("requirement", &self.requirement)
            .finish_non_exhaustive()
    }
}

/// Immutable, ordered set of registered collectors.
#[derive(Debug, Clone, Default)]
pub struct CollectorRegistry {
    specs: Vec<CollectorSpec>,
}

impl CollectorRegistry {
    /// Start building a registry.
    pub fn builder() -> CollectorRegistryBuilder {
        CollectorRegistryBuilder::default()
    }

    /// Registered collectors in registration order.
    pub fn specs(&self) -> &[CollectorSpec] {
        &self.specs
    }

    /// Look up a registration by name.
    pub fn get(&self, name: &str) -> Option<&CollectorSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    /// Number of registered collectors.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Builder rejecting duplicate names.
#[derive(Debug, Default)]
pub struct CollectorRegistryBuilder {
    specs: Vec<CollectorSpec>,
    names: HashSet<String>,
}

impl CollectorRegistryBuilder {
    /// Register `factory` under `name`.
    ///
    /// # Errors
    /// Returns `CollectorError::Duplicate` if `name` is already registered.
    pub fn register(
        mut self,
        name: impl Into<String>,
        factory: impl CollectorFactory,
        requirement: Requirement,
    ) -> Result<Self, CollectorError> {
        let name = name.into();
        if !self.names.insert(name.clone()) {
            return Err(CollectorError::Duplicate(name));
        }
        tracing::debug!(collector = %name, %requirement, "Collector registered");
        self.specs.push(CollectorSpec {
            name,
            factory: Arc::new(factory),
            requirement,
        });
        Ok(self)
    }

    /// Finish the registry.
    pub fn build(self) -> CollectorRegistry {
        CollectorRegistry { specs: self.specs }
    }
}

//! Stage registry - explicit name → factory table
//!
//! Populated once at startup; the builder resolves every `[[stages]]`
//! entry of a blueprint through it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use contracts::{PipelineError, Result, StageConfig};
use tracing::debug;

use crate::data::DataType;
use crate::stage::Stage;

/// Builds a stage from its configuration entry
pub type StageFactory<D> =
    Arc<dyn Fn(&StageConfig) -> Result<Arc<dyn Stage<D>>> + Send + Sync>;

struct FactoryEntry<D: DataType> {
    factory: StageFactory<D>,
    description: String,
}

/// Factories for one payload shape
pub struct StageRegistry<D: DataType> {
    /// Payload name used by blueprints (`data_type = "..."`)
    payload: String,
    factories: BTreeMap<String, FactoryEntry<D>>,
}

impl<D: DataType> fmt::Debug for StageRegistry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("payload", &self.payload)
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<D: DataType> StageRegistry<D> {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            factories: BTreeMap::new(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Register a factory under a unique name
    pub fn register<F>(
        &mut self,
        name: &str,
        description: impl Into<String>,
        factory: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&StageConfig) -> Result<Arc<dyn Stage<D>>> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(PipelineError::duplicate_id("stage registry", name));
        }
        self.factories.insert(
            name.to_string(),
            FactoryEntry {
                factory: Arc::new(factory),
                description: description.into(),
            },
        );
        debug!(payload = %self.payload, factory = name, "Stage factory registered");
        Ok(self)
    }

    pub fn contains(&self, factory: &str) -> bool {
        self.factories.contains_key(factory)
    }

    /// Instantiate the stage named by `config.factory`
    pub fn create(&self, config: &StageConfig) -> Result<Arc<dyn Stage<D>>> {
        let entry = self
            .factories
            .get(&config.factory)
            .ok_or_else(|| PipelineError::unknown_factory(&config.factory))?;
        (entry.factory)(config)
    }

    /// Factory names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// `(name, description)` pairs, sorted by name
    pub fn describe(&self) -> Vec<(&str, &str)> {
        self.factories
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.description.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Consumer;
    use crate::stage::Passthrough;
    use std::collections::HashMap;

    fn stage_config(factory: &str) -> StageConfig {
        StageConfig {
            name: "s".to_string(),
            factory: factory.to_string(),
            priority: 0,
            enabled: true,
            bypassed: false,
            params: HashMap::new(),
        }
    }

    fn registry() -> StageRegistry<Consumer<String>> {
        let mut registry = StageRegistry::new("string");
        registry
            .register("identity", "forwards unchanged", |_| {
                Ok(Arc::new(Passthrough) as Arc<dyn Stage<Consumer<String>>>)
            })
            .unwrap();
        registry
    }

    #[test]
    fn test_create_known_factory() {
        let registry = registry();
        assert!(registry.contains("identity"));
        assert!(registry.create(&stage_config("identity")).is_ok());
        assert_eq!(registry.describe(), [("identity", "forwards unchanged")]);
    }

    #[test]
    fn test_unknown_factory() {
        let registry = registry();
        let err = registry.create(&stage_config("missing")).err().unwrap();
        assert!(matches!(err, PipelineError::UnknownFactory { .. }));
    }

    #[test]
    fn test_duplicate_factory_rejected() {
        let mut registry = registry();
        let err = registry
            .register("identity", "again", |_| {
                Ok(Arc::new(Passthrough) as Arc<dyn Stage<Consumer<String>>>)
            })
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::DuplicateId { .. }));
        assert_eq!(registry.names(), ["identity"]);
    }
}

//! Static effect registry
//!
//! Effects are looked up by name through a factory table configured at
//! startup; there is no runtime UUID or string matching beyond this map.

use crate::engine::{Controller, Engine, EngineConfig};
use crate::error::{CrescendoError, Result};
use std::collections::HashMap;

/// Factory building an engine and its control handle from a configuration
pub type EffectFactory = fn(EngineConfig) -> Result<(Engine, Controller)>;

/// Name → factory table for the effects this crate provides
pub struct EffectRegistry {
    factories: HashMap<&'static str, EffectFactory>,
}

impl EffectRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in effects registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("loudness", Engine::new);
        registry
    }

    /// Register a factory under a name, replacing any previous entry
    pub fn register(&mut self, name: &'static str, factory: EffectFactory) {
        self.factories.insert(name, factory);
    }

    /// Instantiate an effect by name
    pub fn create(&self, name: &str, config: EngineConfig) -> Result<(Engine, Controller)> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| CrescendoError::UnknownEffect {
                name: name.to_string(),
            })?;
        factory(config)
    }

    /// Registered effect names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_loudness_effect() {
        let registry = EffectRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["loudness"]);

        let (engine, _controller) = registry
            .create("loudness", EngineConfig::default())
            .unwrap();
        assert_eq!(engine.config().sample_rate, 48_000);
    }

    #[test]
    fn test_unknown_effect() {
        let registry = EffectRegistry::with_builtins();
        // Map the Ok value away: Engine carries no Debug impl
        let err = registry
            .create("spatializer", EngineConfig::default())
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_EFFECT");
    }

    #[test]
    fn test_factory_failure_propagates() {
        let registry = EffectRegistry::with_builtins();
        let config = EngineConfig {
            sample_rate: 500,
            ..EngineConfig::default()
        };
        let err = registry.create("loudness", config).map(|_| ()).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_CONFLICT");
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::source::{DetectionSource, SourceCapability};

/// A source shared between the registry and the dashboard.
pub type SharedSource = Arc<Mutex<dyn DetectionSource>>;

/// Wrap a source for sharing.
pub fn shared<S: DetectionSource + 'static>(source: S) -> SharedSource {
    Arc::new(Mutex::new(source))
}

/// Registry of detection sources keyed by name.
///
/// Sources are wrapped in `Mutex` because `DetectionSource::produce` takes `&mut self`.
pub struct SourceRegistry {
    sources: HashMap<String, SharedSource>,
    default_name: Option<String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a source. The first registered source becomes the default.
    pub fn register<S: DetectionSource + 'static>(&mut self, source: S) {
        let name = source.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.sources.insert(name, shared(source));
    }

    /// Set default source by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.sources.contains_key(name) {
            return Err(anyhow!(
                "detection source '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedSource> {
        self.sources.get(name).cloned()
    }

    pub fn default_source(&self) -> Option<SharedSource> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered source names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a source that supports the requested capability.
    ///
    /// Prefers the default source when it supports the capability.
    pub fn source_for_capability(&self, capability: SourceCapability) -> Result<SharedSource> {
        if let Some(default_source) = self.default_source() {
            let supports = {
                let guard = default_source
                    .lock()
                    .map_err(|_| anyhow!("default source lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(default_source);
            }
        }

        for name in self.list() {
            let Some(source) = self.get(&name) else {
                continue;
            };
            let supports = {
                let guard = source
                    .lock()
                    .map_err(|_| anyhow!("source lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(source);
            }
        }

        Err(anyhow!(
            "no registered detection source supports {:?}",
            capability
        ))
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::{CannedSource, SimulatedSource};

    #[test]
    fn first_registered_source_is_default() {
        let mut registry = SourceRegistry::new();
        registry.register(CannedSource::new());
        registry.register(SimulatedSource::with_seed(7));

        let default = registry.default_source().unwrap();
        assert_eq!(default.lock().unwrap().name(), "mock");
        assert_eq!(registry.list(), vec!["mock", "simulated"]);
    }

    #[test]
    fn set_default_rejects_unknown_names() {
        let mut registry = SourceRegistry::new();
        registry.register(CannedSource::new());
        let err = registry.set_default("api").unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn capability_lookup_skips_unsuitable_default() -> Result<()> {
        let mut registry = SourceRegistry::new();
        registry.register(CannedSource::new());
        registry.register(SimulatedSource::with_seed(1));

        let live = registry.source_for_capability(SourceCapability::LiveFeed)?;
        assert_eq!(live.lock().unwrap().name(), "simulated");
        Ok(())
    }
}

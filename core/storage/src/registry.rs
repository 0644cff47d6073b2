//! Driver registry for resolving provider kinds to backend sessions.

use std::collections::HashMap;
use std::sync::Arc;

use stowaway_common::{ConfigMap, Error, Result};
use crate::driver::Location;
use crate::memory::MemoryBackend;

/// Factory function type for dialing a backend.
pub type DriverFactory = Box<dyn Fn(&ConfigMap) -> Result<Arc<dyn Location>> + Send + Sync>;

/// Registry of driver factories keyed by provider kind.
///
/// Populated once at startup and shared read-only afterwards.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a driver factory.
    ///
    /// # Preconditions
    /// - `kind` must be unique within the registry
    ///
    /// # Errors
    /// - Returns error if kind is already registered
    pub fn register(&mut self, kind: impl Into<String>, factory: DriverFactory) -> Result<()> {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(Error::AlreadyExists(format!(
                "Driver '{}' is already registered",
                kind
            )));
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    /// Open a session on the backend identified by `kind`.
    ///
    /// # Errors
    /// - Kind not registered
    /// - Configuration rejected by the driver
    pub fn dial(&self, kind: &str, config: &ConfigMap) -> Result<Arc<dyn Location>> {
        let factory = self.factories.get(kind).ok_or_else(|| {
            Error::Connection(format!("Driver '{}' is not registered", kind))
        })?;
        factory(config)
    }

    /// Get the registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Check if a kind is registered.
    pub fn has_kind(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in drivers.
///
/// # Errors
/// - Returns error if a built-in kind is registered twice
pub fn create_default_registry() -> Result<DriverRegistry> {
    let mut registry = DriverRegistry::new();

    // In-memory backend shared by every session of this registry
    let backend = MemoryBackend::new();
    registry.register(
        crate::memory::KIND,
        Box::new(move |config| backend.dial(config)),
    )?;

    // Local filesystem backend
    registry.register(
        crate::local::KIND,
        Box::new(crate::local::dial),
    )?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_factory() -> DriverFactory {
        let backend = MemoryBackend::new();
        Box::new(move |config| backend.dial(config))
    }

    #[test]
    fn test_register_and_dial() {
        let mut registry = DriverRegistry::new();
        registry.register("test", memory_factory()).unwrap();

        let location = registry.dial("test", &ConfigMap::new()).unwrap();
        assert_eq!(location.kind(), "memdriver");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = DriverRegistry::new();
        registry.register("test", memory_factory()).unwrap();

        let result = registry.register("test", memory_factory());
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_dial_unknown_fails() {
        let registry = DriverRegistry::new();
        let result = registry.dial("unknown", &ConfigMap::new());
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[test]
    fn test_default_registry_kinds() {
        let registry = create_default_registry().unwrap();
        assert_eq!(registry.kinds(), vec!["local".to_string(), "memdriver".to_string()]);
        assert!(registry.has_kind("memdriver"));
        assert!(!registry.has_kind("s3"));
    }

    #[test]
    fn test_factory_errors_propagate() {
        let registry = create_default_registry().unwrap();
        let result = registry.dial("local", &ConfigMap::new());
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Driver Registry
//!
//! Central registry for all available driver factories, keyed by dialect.
//! Provides plugin-like architecture for adding new dialects.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::traits::DriverFactory;
use crate::engine::types::Dialect;

/// Registry that holds one driver factory per dialect
pub struct DriverRegistry {
    factories: HashMap<Dialect, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a new factory
    ///
    /// The factory's `dialect()` is used as the key; a later registration
    /// for the same dialect replaces the earlier one.
    pub fn register(&mut self, factory: Arc<dyn DriverFactory>) {
        self.factories.insert(factory.dialect(), factory);
    }

    /// Gets the factory for a dialect
    pub fn get(&self, dialect: Dialect) -> Option<Arc<dyn DriverFactory>> {
        self.factories.get(&dialect).cloned()
    }

    /// Returns the number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no factories are registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockFactory;

    #[test]
    fn test_registry_basics() {
        let mut registry = DriverRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(MockFactory::new(Dialect::DuckDb)));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());

        registry.register(Arc::new(MockFactory::new(Dialect::Postgres)));
        assert_eq!(registry.len(), 2);

        assert!(registry.get(Dialect::DuckDb).is_some());
        assert!(registry.get(Dialect::Postgres).is_some());
        assert!(registry.get(Dialect::BigQuery).is_none());
    }

    #[test]
    fn test_reregistering_replaces() {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(MockFactory::new(Dialect::DuckDb)));
        registry.register(Arc::new(MockFactory::new(Dialect::DuckDb)));
        assert_eq!(registry.len(), 1);
    }
}

//! Registry of named transformers.

use crate::transformer::Transformer;
use indexmap::IndexMap;
use std::sync::Arc;

/// A registered transformer and what it is for.
#[derive(Clone)]
pub struct Entry {
    /// Human-readable description.
    pub description: String,
    pub transformer: Arc<dyn Transformer>,
}

/// Registry of available transformers, keyed by name.
///
/// Workflows refer to transformers by the names registered here.
/// Iteration follows registration order.
#[derive(Clone, Default)]
pub struct Registry {
    entries: IndexMap<String, Entry>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformer under `name`, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        transformer: Arc<dyn Transformer>,
    ) {
        self.entries.insert(
            name.into(),
            Entry {
                description: description.into(),
                transformer,
            },
        );
    }

    /// Get a transformer by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        self.entries
            .get(name)
            .map(|entry| Arc::clone(&entry.transformer))
    }

    /// Get the full entry for `name`.
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Iterate over all entries with their names.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Number of registered transformers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Replicate, arc};
    use crate::value::ValueType;

    fn make_test_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register("twice", "emit input + 1 twice", arc(Replicate(2)));
        registry.register("once", "emit input + 1", arc(Replicate(1)));
        registry
    }

    #[test]
    fn test_get() {
        let registry = make_test_registry();

        assert!(registry.get("twice").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(
            registry.get("once").map(|t| t.input_type()),
            Some(ValueType::Int)
        );
    }

    #[test]
    fn test_entries_keep_registration_order() {
        let registry = make_test_registry();
        let names: Vec<_> = registry.entries().map(|(name, _)| name).collect();

        assert_eq!(names, vec!["twice", "once"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.entry("once").map(|e| e.description.as_str()),
            Some("emit input + 1")
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = make_test_registry();
        registry.register("once", "replaced", arc(Replicate(5)));

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.entry("once").map(|e| e.description.as_str()),
            Some("replaced")
        );
    }
}

//! Filter capability - pluggable value extraction and qualification for rule
//! parts, plus the registry that resolves filters by name.

use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::error::{PartitionError, Result};
use crate::hierarchy::{lookup, FieldNotFound};

/// Plugin reference of the built-in pass-through filter.
pub const DEFAULT_FILTER: &str = "default";

/// Customizes how one rule part extracts its value and whether the record
/// qualifies for the rule at all.
///
/// Both methods have defaults, so implementations override only what they
/// need.
pub trait Filter: Send + Sync {
    /// Extract the value for `field` from `record`. Defaults to a
    /// hierarchical lookup.
    fn get_value<'r>(&self, field: &str, record: &'r Value) -> std::result::Result<Cow<'r, Value>, FieldNotFound> {
        lookup(record, field).map(Cow::Borrowed)
    }

    /// Whether the record stays in this rule given the extracted value.
    fn does_qualify(&self, _field: &str, _value: &Value) -> bool {
        true
    }
}

/// Pass-through filter: default lookup, everything qualifies.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFilter;

impl Filter for DefaultFilter {}

/// Produces a fresh filter instance for each rule part that uses it.
pub type FilterFactory = Arc<dyn Fn() -> Box<dyn Filter> + Send + Sync>;

/// Filter names (as used in rules) resolved to their factories.
pub type FilterMappings = HashMap<String, FilterFactory>;

/// Registry of filter factories keyed by plugin reference.
///
/// Configuration maps a short filter name to a plugin reference; the registry
/// turns those references into factories once, before any rule is built.
pub struct FilterRegistry {
    factories: HashMap<String, FilterFactory>,
}

impl FilterRegistry {
    /// A registry holding only the built-in filters.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_FILTER, || DefaultFilter);
        registry
    }

    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a filter under `reference`, replacing any previous entry.
    pub fn register<F, T>(&mut self, reference: impl Into<String>, factory: F)
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Filter + 'static,
    {
        let factory: FilterFactory = Arc::new(move || Box::new(factory()) as Box<dyn Filter>);
        self.factories.insert(reference.into(), factory);
    }

    pub fn get(&self, reference: &str) -> Option<FilterFactory> {
        self.factories.get(reference).cloned()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.factories.contains_key(reference)
    }

    /// Resolve configured `filter name -> plugin reference` pairs.
    pub fn resolve_mappings(&self, mappings: &BTreeMap<String, String>) -> Result<FilterMappings> {
        let mut resolved = HashMap::with_capacity(mappings.len());

        for (name, reference) in mappings {
            debug!("Processing filter mapping [{}] -> [{}]", name, reference);

            let factory = self
                .get(reference)
                .ok_or_else(|| PartitionError::UnknownPlugin {
                    name: name.clone(),
                    reference: reference.clone(),
                })?;

            resolved.insert(name.clone(), factory);
        }

        Ok(resolved)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Suffixed;

    impl Filter for Suffixed {
        fn get_value<'r>(&self, field: &str, _record: &'r Value) -> std::result::Result<Cow<'r, Value>, FieldNotFound> {
            Ok(Cow::Owned(Value::String(format!("{}:xyz", field))))
        }
    }

    #[test]
    fn test_default_get_value() {
        let filter = DefaultFilter;
        let data = json!({"aa": 11, "bb": 22, "cc": 33});

        assert_eq!(filter.get_value("aa", &data).unwrap().as_ref(), &json!(11));
        assert_eq!(filter.get_value("bb", &data).unwrap().as_ref(), &json!(22));
        assert_eq!(filter.get_value("cc", &data).unwrap().as_ref(), &json!(33));
    }

    #[test]
    fn test_default_get_value_missing() {
        let filter = DefaultFilter;
        let err = filter.get_value("zz", &json!({"aa": 1})).unwrap_err();
        assert_eq!(err.reference, "zz");
    }

    #[test]
    fn test_default_qualifies_everything() {
        assert!(DefaultFilter.does_qualify("aa", &json!("anything")));
    }

    #[test]
    fn test_overridden_get_value() {
        let empty = json!({});
        let value = Suffixed.get_value("field2", &empty).unwrap();
        assert_eq!(value.as_ref(), &json!("field2:xyz"));
    }

    #[test]
    fn test_registry_has_builtin_default() {
        let registry = FilterRegistry::new();
        assert!(registry.contains(DEFAULT_FILTER));
        assert!(!FilterRegistry::empty().contains(DEFAULT_FILTER));
    }

    #[test]
    fn test_resolve_mappings() {
        let mut registry = FilterRegistry::new();
        registry.register("test.Suffixed", || Suffixed);

        let mappings = BTreeMap::from([
            ("suffix".to_string(), "test.Suffixed".to_string()),
            ("plain".to_string(), DEFAULT_FILTER.to_string()),
        ]);
        let resolved = registry.resolve_mappings(&mappings).unwrap();
        assert_eq!(resolved.len(), 2);

        let filter = (resolved["suffix"])();
        let empty = json!({});
        let value = filter.get_value("f", &empty).unwrap();
        assert_eq!(value.as_ref(), &json!("f:xyz"));
    }

    #[test]
    fn test_resolve_mappings_unknown_plugin() {
        let registry = FilterRegistry::new();
        let mappings = BTreeMap::from([("x".to_string(), "no.such.Filter".to_string())]);

        match registry.resolve_mappings(&mappings) {
            Err(PartitionError::UnknownPlugin { name, reference }) => {
                assert_eq!(name, "x");
                assert_eq!(reference, "no.such.Filter");
            }
            other => panic!("Expected UnknownPlugin, got {:?}", other.map(|m| m.len())),
        }
    }
}

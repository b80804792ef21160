use std::collections::{HashMap, HashSet};

use crate::entity::ValueType;
use crate::error::{ModelError, Result};
use crate::resolved::ResolvedValue;
use crate::sample::Gender;

/// Names with this suffix (and anonymous values) bypass the cache.
const NOCACHE_SUFFIX: &str = ".NOCACHE";

/// Per-pass memoization of resolved attributes.
///
/// One cache gives one rendering pass a consistent view: an attribute is
/// resolved once and every later reference sees the same value and gender.
/// The in-progress set doubles as cycle detection; re-entering a name that
/// is still being resolved is a circular dependency.
#[derive(Debug, Default)]
pub struct Cache {
    in_progress: HashSet<String>,
    resolved: HashMap<String, ResolvedValue>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn bypassed(name: Option<&str>) -> bool {
        match name {
            None => true,
            Some(name) => name.ends_with(NOCACHE_SUFFIX),
        }
    }

    /// Returns the memoized value, or `None` after marking the name as
    /// in progress. Fails if the name is already being resolved.
    pub fn get_resolved(&mut self, name: Option<&str>) -> Result<Option<ResolvedValue>> {
        if Self::bypassed(name) {
            return Ok(None);
        }
        let name = name.unwrap_or_default();

        if let Some(value) = self.resolved.get(name) {
            return Ok(Some(value.clone()));
        }

        if !self.in_progress.insert(name.to_string()) {
            return Err(ModelError::CircularDependency(name.to_string()));
        }

        Ok(None)
    }

    /// Memoizes a fully resolved value and clears its in-progress mark.
    pub fn set_resolved(&mut self, value: ResolvedValue) {
        if Self::bypassed(value.name.as_deref()) {
            return;
        }
        if let Some(name) = value.name.clone() {
            self.in_progress.remove(&name);
            self.resolved.insert(name, value);
        }
    }

    /// Seeds the cache with an externally supplied string value
    /// (path variables, query parameters, request attributes).
    pub fn add_resolved(&mut self, name: &str, value: &str) {
        let mut resolved = ResolvedValue::new(Some(name.to_string()), ValueType::Str, value);
        resolved.set_value(value.to_string(), Gender::Neutral);
        self.resolved.insert(name.to_string(), resolved);
    }

    /// Concrete lookup; fails when the attribute is absent.
    pub fn get_value(&self, name: &str) -> Result<&ResolvedValue> {
        self.resolved
            .get(name)
            .ok_or_else(|| ModelError::AttributeNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedValue> {
        self.resolved.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.resolved.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_set_then_hit() {
        let mut cache = Cache::new();
        assert!(cache.get_resolved(Some("employee.name")).unwrap().is_none());

        let mut value = ResolvedValue::new(
            Some("employee.name".to_string()),
            ValueType::Str,
            "func.sample(names)",
        );
        value.set_value("Alice".to_string(), Gender::Female);
        cache.set_resolved(value);

        let hit = cache.get_resolved(Some("employee.name")).unwrap().unwrap();
        assert_eq!(hit.value(), Some("Alice"));
        assert_eq!(hit.gender(), Gender::Female);
    }

    #[test]
    fn reentrant_miss_is_a_circular_dependency() {
        let mut cache = Cache::new();
        assert!(cache.get_resolved(Some("a.b")).unwrap().is_none());
        let result = cache.get_resolved(Some("a.b"));
        assert!(matches!(result, Err(ModelError::CircularDependency(_))));
    }

    #[test]
    fn nocache_suffix_bypasses_everything() {
        let mut cache = Cache::new();
        assert!(cache.get_resolved(Some("x.NOCACHE")).unwrap().is_none());
        // No in-progress mark, so a second miss is still fine.
        assert!(cache.get_resolved(Some("x.NOCACHE")).unwrap().is_none());
        assert!(cache.get_resolved(None).unwrap().is_none());

        let mut value =
            ResolvedValue::new(Some("x.NOCACHE".to_string()), ValueType::Str, "template");
        value.set_value("v".to_string(), Gender::Neutral);
        cache.set_resolved(value);
        assert!(!cache.has("x.NOCACHE"));
    }
}

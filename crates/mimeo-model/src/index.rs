use std::collections::HashMap;

use crate::entity::{Entity, EntityKind};
use crate::error::{ModelError, Result};

/// Nesting depth after which a reference chain is declared circular.
const MAX_REF_DEPTH: usize = 50;

/// Flat index over the entity hierarchy, keyed by full dotted name.
///
/// Lookups follow `Ref` links to the concrete entity and expand
/// `[name, count]` / `[name, min-max]` references into transient Repeat
/// entities. Synthesized repeats are never stored; they are rebuilt on
/// every lookup so redefinition of the target stays visible.
#[derive(Debug, Default)]
pub struct EntityIndex {
    index: HashMap<String, Entity>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every entity under the given root. The root itself is not
    /// stored when its name is empty.
    pub fn from_root(root: &Entity) -> Self {
        let mut index = Self::new();
        if root.name.is_empty() {
            for child in root.children() {
                index.add(None, child);
            }
        } else {
            index.add(None, root);
        }
        index
    }

    /// Adds an entity and, for containers, all of its descendants.
    pub fn add(&mut self, parent: Option<&str>, entity: &Entity) {
        let full_name = match parent {
            Some(parent) => format!("{parent}.{}", entity.name),
            None => entity.name.clone(),
        };

        self.index.insert(full_name.clone(), entity.clone());

        if entity.is_container() {
            for child in entity.children() {
                self.add(Some(&full_name), child);
            }
        }
    }

    /// Finds an entity by full name, following ref links.
    pub fn find(&self, full_name: &str) -> Result<Entity> {
        self.find_at(full_name, 0)
    }

    fn find_at(&self, full_name: &str, depth: usize) -> Result<Entity> {
        if depth > MAX_REF_DEPTH {
            return Err(ModelError::CircularReference(full_name.to_string()));
        }

        if full_name.starts_with('"') {
            return Err(ModelError::BadRepeat {
                def: full_name.to_string(),
                reason: "entity name must not be enclosed in quotes".into(),
            });
        }

        if let Some(inner) = full_name.strip_prefix('[') {
            let Some(inner) = inner.strip_suffix(']') else {
                return Err(ModelError::BadRepeat {
                    def: full_name.to_string(),
                    reason: "must be enclosed in square brackets".into(),
                });
            };
            return self.synthesize_repeat(full_name, inner, depth);
        }

        match self.index.get(full_name) {
            Some(entity) => {
                if let EntityKind::Ref { target } = &entity.kind {
                    return self.find_at(target, depth + 1);
                }
                Ok(entity.clone())
            }
            None => Err(ModelError::EntityNotFound(full_name.to_string())),
        }
    }

    /// Builds a transient Repeat entity from the bracket contents,
    /// e.g. `employee, 3` or `employee, 0-7`. The count is optional
    /// because persisted routes take their count from the file store.
    fn synthesize_repeat(&self, def: &str, inner: &str, depth: usize) -> Result<Entity> {
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        let (target, count) = match parts.as_slice() {
            [target] => (*target, "0"),
            [target, count] => (*target, *count),
            _ => {
                return Err(ModelError::BadRepeat {
                    def: def.to_string(),
                    reason: "format must be [name, count] or [name, min-max]".into(),
                });
            }
        };

        // Validate the target now so a bad reference fails at the point
        // of use rather than mid-render.
        self.find_at(target, depth + 1)
            .map_err(|e| ModelError::BadRepeat {
                def: def.to_string(),
                reason: e.to_string(),
            })?;

        let (min, max) = parse_range(count).ok_or_else(|| ModelError::BadRepeat {
            def: def.to_string(),
            reason: "format must be [name, count] or [name, min-max]".into(),
        })?;

        Ok(Entity::repeat(target, min, max))
    }
}

/// Parses `N` into (N, N) and `a-b` into (a, b), swapped if reversed.
fn parse_range(count: &str) -> Option<(i64, i64)> {
    match count.split_once('-') {
        Some((lo, hi)) => {
            let min = lo.trim().parse::<i64>().ok()?;
            let max = hi.trim().parse::<i64>().ok()?;
            Some(if min > max { (max, min) } else { (min, max) })
        }
        None => {
            let n = count.trim().parse::<i64>().ok()?;
            Some((n, n))
        }
    }
}

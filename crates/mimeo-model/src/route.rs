use std::fmt;

use crate::cache::Cache;

/// A single API resource path, e.g. `/api/employees/{id}`.
///
/// Segments wrapped in curly braces are variables and match any
/// incoming segment.
#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    parts: Vec<String>,
    is_var: Vec<bool>,
}

impl Route {
    pub fn new(path: &str) -> Self {
        let mut parts = Vec::new();
        let mut is_var = Vec::new();

        for part in path.split('/') {
            match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(var) => {
                    parts.push(var.to_string());
                    is_var.push(true);
                }
                None => {
                    parts.push(part.to_string());
                    is_var.push(false);
                }
            }
        }

        Self {
            path: path.to_string(),
            parts,
            is_var,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Names of the variable segments, in path order.
    pub fn vars(&self) -> Vec<&str> {
        self.parts
            .iter()
            .zip(&self.is_var)
            .filter(|(_, is_var)| **is_var)
            .map(|(part, _)| part.as_str())
            .collect()
    }

    /// True when both routes would match the same concrete paths.
    /// Variable names are irrelevant to the shape.
    pub fn same_shape(&self, other: &Route) -> bool {
        self.parts.len() == other.parts.len()
            && self
                .parts
                .iter()
                .zip(&self.is_var)
                .zip(other.parts.iter().zip(&other.is_var))
                .all(|((a, a_var), (b, b_var))| (*a_var && *b_var) || (!a_var && !b_var && a == b))
    }

    /// Matches an incoming route against this definition. On a match the
    /// returned cache holds every captured variable under `path.<name>`.
    pub fn matches(&self, incoming: &Route) -> Option<Cache> {
        if self.parts.len() != incoming.parts.len() {
            return None;
        }

        let mut cache = Cache::new();
        for i in 0..self.parts.len() {
            if self.is_var[i] {
                cache.add_resolved(&format!("path.{}", self.parts[i]), &incoming.parts[i]);
            } else if incoming.is_var[i] {
                cache.add_resolved(&format!("path.{}", incoming.parts[i]), &self.parts[i]);
            } else if self.parts[i] != incoming.parts[i] {
                return None;
            }
        }

        Some(cache)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_capture_incoming_segments() {
        let defined = Route::new("/api/employees/{id}");
        let incoming = Route::new("/api/employees/5");

        let cache = defined.matches(&incoming).unwrap();
        assert_eq!(cache.get_value("path.id").unwrap().value(), Some("5"));
    }

    #[test]
    fn segment_count_must_match() {
        let defined = Route::new("/api/employees/{id}");
        assert!(defined.matches(&Route::new("/api/employees")).is_none());
        assert!(defined.matches(&Route::new("/api/employees/5/extra")).is_none());
    }

    #[test]
    fn literal_mismatch_fails() {
        let defined = Route::new("/api/employees/{id}");
        assert!(defined.matches(&Route::new("/api/orders/5")).is_none());
    }

    #[test]
    fn shape_comparison_ignores_variable_names() {
        let a = Route::new("/api/employees/{id}");
        let b = Route::new("/api/employees/{key}");
        let c = Route::new("/api/employees/fixed");
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }
}

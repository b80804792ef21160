use std::collections::HashMap;
use std::fmt;

use crate::entity::Entity;
use crate::error::{ModelError, Result};
use crate::persist::Persistence;
use crate::route::Route;

/// HTTP methods the simulator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "PUT" => Some(Self::Put),
            "POST" => Some(Self::Post),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An API request or response body definition.
///
/// Parsed from `entity[, mods...]` where the entity may be a repeating
/// reference in square brackets, e.g.
///
/// ```text
/// [employee, 0-7], id=~path.id, !salary
/// ```
///
/// Mods are keyed by full attribute name (`employee.id`); an omit mod
/// (`!attr`) maps to `None`, the wildcard mod keeps its bare `*` key.
#[derive(Debug, Clone)]
pub struct ApiBody {
    pub entity_def: String,
    pub entity_name: String,
    mods: HashMap<String, Option<String>>,
}

impl ApiBody {
    pub fn parse(body_def: &str) -> Result<Self> {
        let body_def = body_def.trim();
        let bad = |reason: &str| ModelError::BadBody {
            def: body_def.to_string(),
            reason: reason.to_string(),
        };

        let (entity_def, entity_name, mods_str) = if let Some(rest) = body_def.strip_prefix('[') {
            let close = rest.find(']').ok_or_else(|| bad("missing closing bracket ']'"))?;
            let entity_def = body_def[..close + 2].trim().to_string();

            let inner: Vec<&str> = entity_def[1..entity_def.len() - 1]
                .split(',')
                .map(str::trim)
                .collect();
            let entity_name = inner[0].to_string();
            let count_ok = match inner.as_slice() {
                [name] => !name.is_empty(),
                [name, count] => !name.is_empty() && !count.is_empty(),
                _ => false,
            };
            if !count_ok {
                return Err(bad("repeating entity format must be [name, count] or [name, min-max]"));
            }

            (entity_def, entity_name, &body_def[close + 2..])
        } else {
            let (entity_name, mods_str) = match body_def.split_once(',') {
                Some((name, rest)) => (name.trim(), rest),
                None => (body_def, ""),
            };
            if entity_name.is_empty() {
                return Err(bad("missing entity name"));
            }
            (entity_name.to_string(), entity_name.to_string(), mods_str)
        };

        let mut mods = HashMap::new();
        for raw in mods_str.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            if let Some(attr) = raw.strip_prefix('!') {
                mods.insert(format!("{entity_name}.{attr}"), None);
                continue;
            }

            let (attr, value) = match raw.split_once('=') {
                Some((attr, value)) => (attr.trim(), value.trim()),
                None => (raw, ""),
            };

            // Badly formed mods are skipped rather than fatal.
            if attr == "*" {
                mods.insert(attr.to_string(), Some(value.to_string()));
            } else if !attr.is_empty() && !value.is_empty() {
                mods.insert(format!("{entity_name}.{attr}"), Some(value.to_string()));
            }
        }

        Ok(Self {
            entity_def,
            entity_name,
            mods,
        })
    }

    /// True when the attribute carries an omit mod.
    pub fn omitted(&self, full_name: &str) -> bool {
        matches!(self.mods.get(full_name), Some(None))
    }

    /// The replacement value for the attribute, if a value mod exists.
    pub fn mod_value(&self, full_name: &str) -> Option<&str> {
        self.mods.get(full_name).and_then(|v| v.as_deref())
    }

    /// The `*` wildcard mod value, if present.
    pub fn wildcard(&self) -> Option<&str> {
        self.mod_value("*")
    }

    /// All value mods (attribute name, replacement), omits excluded.
    pub fn value_mods(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mods
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }
}

/// One API definition: method, route and optional bodies/persistence.
#[derive(Debug, Clone)]
pub struct Api {
    pub method: Method,
    pub route: Route,
    pub request: Option<ApiBody>,
    pub response: Option<ApiBody>,
    pub persist: Option<Persistence>,
}

impl Api {
    pub fn new(method: Method, route: Route) -> Self {
        Self {
            method,
            route,
            request: None,
            response: None,
            persist: None,
        }
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.persist {
            Some(persist) => write!(f, "{} {} (persist: {})", self.method, self.route, persist.def()),
            None => write!(f, "{} {}", self.method, self.route),
        }
    }
}

/// A complete loaded service: the entity hierarchy plus its APIs.
#[derive(Debug, Clone)]
pub struct ApiService {
    /// Root container; its empty name keeps it out of the index.
    pub root: Entity,
    pub apis: Vec<Api>,
}

impl Default for ApiService {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiService {
    pub fn new() -> Self {
        Self {
            root: Entity::parent(""),
            apis: Vec::new(),
        }
    }

    /// Outline of the whole service for display.
    pub fn pretty(&self) -> String {
        let mut out = self.root.pretty();
        out.push_str("api:\n");
        for api in &self.apis {
            out.push_str(&format!("  {api}\n"));
        }
        out
    }
}

use std::collections::HashMap;

use serde_json::Value;

use mimeo_model::{Entity, NULL_VALUE, Persistence, ValueType};

use crate::error::{SchemaError, SchemaResult};

/// Builds an entity hierarchy from a raw JSON document, e.g. a request
/// body or a stored record. Accepts both strict JSON and the relaxed
/// form the formatter emits.
pub fn entity_from_json(name: &str, json: &str) -> SchemaResult<Entity> {
    let bad = |reason: String| SchemaError::JsonEntity {
        name: name.to_string(),
        reason,
    };

    let tree: Value =
        serde_json::from_str(&normalize_relaxed(json)).map_err(|e| bad(e.to_string()))?;

    match tree {
        Value::Object(fields) => {
            let mut entity = Entity::parent(name);
            for (field, node) in fields {
                let child = node_to_entity(&field, &node)?;
                entity.add_child(child)?;
            }
            Ok(entity)
        }
        Value::Array(items) => {
            // A top-level array keeps the entity's own name, so its
            // elements flatten to `<name>.~N.<field>` keys.
            let mut array = Entity::array(name);
            for (i, item) in items.iter().enumerate() {
                array.add_child(node_to_entity(&format!("~{}", i + 1), item)?)?;
            }
            Ok(array)
        }
        _ => Err(bad("document must be an object or an array".into())),
    }
}

fn node_to_entity(name: &str, node: &Value) -> SchemaResult<Entity> {
    match node {
        Value::Object(fields) => {
            let mut entity = Entity::parent(name);
            for (field, child) in fields {
                entity.add_child(node_to_entity(field, child)?)?;
            }
            Ok(entity)
        }
        Value::Array(items) => {
            let mut entity = Entity::array(name);
            for (i, item) in items.iter().enumerate() {
                entity.add_child(node_to_entity(&format!("~{}", i + 1), item)?)?;
            }
            Ok(entity)
        }
        Value::Number(n) => Ok(Entity::scalar(name, ValueType::Num, n.to_string())),
        Value::Bool(b) => Ok(Entity::scalar(name, ValueType::Bool, b.to_string())),
        Value::Null => Ok(Entity::scalar(name, ValueType::Str, NULL_VALUE)),
        Value::String(s) => Ok(Entity::scalar(name, ValueType::Str, s.clone())),
    }
}

/// One record split out of a persisted JSON document, with the values
/// of its top-level persistence variables.
#[derive(Debug, Clone)]
pub struct PersistRecord {
    pub json: String,
    pub vars: HashMap<String, String>,
}

impl PersistRecord {
    fn from_object(node: &Value, persist: &Persistence) -> Self {
        let mut vars = HashMap::new();

        if let Some(fields) = node.as_object() {
            for var in persist.vars() {
                if let Some(value) = fields.get(var) {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    vars.insert(var.clone(), value);
                }
            }
        }

        Self {
            json: node.to_string(),
            vars,
        }
    }
}

/// Splits a JSON array into one record per element.
pub fn array_records(json: &str, persist: &Persistence) -> SchemaResult<Vec<PersistRecord>> {
    let tree: Value = serde_json::from_str(&normalize_relaxed(json))?;
    let items = tree.as_array().ok_or_else(|| SchemaError::JsonEntity {
        name: persist.def().to_string(),
        reason: "expected a JSON array of records".into(),
    })?;

    Ok(items
        .iter()
        .map(|item| PersistRecord::from_object(item, persist))
        .collect())
}

/// Reads a single JSON object as one record.
pub fn object_record(json: &str, persist: &Persistence) -> SchemaResult<PersistRecord> {
    let tree: Value = serde_json::from_str(&normalize_relaxed(json))?;
    Ok(PersistRecord::from_object(&tree, persist))
}

/// Quotes bare object keys so relaxed JSON (`{id: 5, name: "Bob"}`)
/// parses as strict JSON. Strict input passes through unchanged.
pub fn normalize_relaxed(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 16);
    let mut chars = json.chars().peekable();
    // Context stack: true = inside an object, expecting keys.
    let mut stack: Vec<bool> = Vec::new();
    let mut expect_key = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push(c);
                let mut escaped = false;
                for s in chars.by_ref() {
                    out.push(s);
                    if escaped {
                        escaped = false;
                    } else if s == '\\' {
                        escaped = true;
                    } else if s == '"' {
                        break;
                    }
                }
                expect_key = false;
            }
            '{' => {
                out.push(c);
                stack.push(true);
                expect_key = true;
            }
            '[' => {
                out.push(c);
                stack.push(false);
                expect_key = false;
            }
            '}' | ']' => {
                out.push(c);
                stack.pop();
                expect_key = false;
            }
            ',' => {
                out.push(c);
                expect_key = stack.last().copied().unwrap_or(false);
            }
            c if c.is_whitespace() => out.push(c),
            c if expect_key => {
                // Bare key: capture up to the colon and quote it.
                let mut key = String::new();
                key.push(c);
                while let Some(&next) = chars.peek() {
                    if next == ':' {
                        break;
                    }
                    key.push(next);
                    chars.next();
                }
                out.push('"');
                out.push_str(key.trim_end());
                out.push('"');
                if key.len() > key.trim_end().len() {
                    out.push_str(&key[key.trim_end().len()..]);
                }
                expect_key = false;
            }
            _ => out.push(c),
        }
    }

    out
}

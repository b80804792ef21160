use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Placeholder template/value for attributes that render as JSON null.
pub const NULL_VALUE: &str = "<null>";

/// Scalar attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Str,
    Num,
    Bool,
    Date,
    Obj,
}

impl ValueType {
    /// Parses a type keyword, case-insensitively.
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_uppercase().as_str() {
            "STR" => Some(Self::Str),
            "NUM" => Some(Self::Num),
            "BOOL" => Some(Self::Bool),
            "DATE" => Some(Self::Date),
            "OBJ" => Some(Self::Obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "STR",
            Self::Num => "NUM",
            Self::Bool => "BOOL",
            Self::Date => "DATE",
            Self::Obj => "OBJ",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an entity node is: a container, a link, or a templated scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    /// Named object with ordered children.
    Parent,
    /// Ordered list; children carry generated `~N` names.
    Array,
    /// Expands to `min..=max` instances of the target entity. The target
    /// is stored by name because it may be redefined before rendering.
    Repeat { target: String, min: i64, max: i64 },
    /// Link to another entity by full dotted name.
    Ref { target: String },
    /// Bottom-level attribute with a value template.
    Scalar { ty: ValueType, template: String },
}

/// A node in the entity hierarchy.
///
/// Containers (Parent/Array) hold ordered children; every other kind is a
/// leaf. Child names are unique within one parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    children: Vec<Entity>,
}

impl Entity {
    pub fn parent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Parent,
            children: Vec::new(),
        }
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Array,
            children: Vec::new(),
        }
    }

    /// Creates a repeating entity for the target. The node takes the
    /// target's last path segment prefixed with `~` as its own name.
    pub fn repeat(target: impl Into<String>, min: i64, max: i64) -> Self {
        let target = target.into();
        let last = target.rsplit('.').next().unwrap_or(target.as_str());
        Self {
            name: format!("~{last}"),
            kind: EntityKind::Repeat { target, min, max },
            children: Vec::new(),
        }
    }

    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Ref {
                target: target.into(),
            },
            children: Vec::new(),
        }
    }

    pub fn scalar(name: impl Into<String>, ty: ValueType, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Scalar {
                ty,
                template: template.into(),
            },
            children: Vec::new(),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, EntityKind::Parent | EntityKind::Array)
    }

    pub fn children(&self) -> &[Entity] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Entity> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Generated name for the next element appended to an Array.
    pub fn next_item_name(&self) -> String {
        format!("~{}", self.children.len() + 1)
    }

    /// Appends a child, rejecting duplicate names.
    pub fn add_child(&mut self, child: Entity) -> Result<()> {
        if !self.is_container() {
            return Err(ModelError::InvalidEntity {
                name: self.name.clone(),
                reason: "only Parent and Array entities can have children".into(),
            });
        }

        if self.child(&child.name).is_some() {
            return Err(ModelError::DuplicateChild {
                parent: self.name.clone(),
                child: child.name,
            });
        }

        self.children.push(child);
        Ok(())
    }

    /// Human-readable outline of the hierarchy, one attribute per line.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_into(&mut out, "");
        out
    }

    fn pretty_into(&self, out: &mut String, indent: &str) {
        // Generated array-element names are not worth showing.
        let is_item = self.name.starts_with('~');

        if self.is_container() {
            // An unnamed container (the service root) contributes no line
            // of its own.
            let child_indent = if is_item || self.name.is_empty() {
                indent.to_string()
            } else {
                out.push_str(&format!("{indent}{}:\n", self.name));
                format!("{}  ", indent.replace('-', " "))
            };

            let mut first = is_item;
            for child in &self.children {
                if first {
                    child.pretty_into(out, &format!("{child_indent}- "));
                    first = false;
                } else {
                    child.pretty_into(out, &child_indent);
                }
            }
            return;
        }

        let detail = match &self.kind {
            EntityKind::Repeat { target, .. } => format!("REPEAT, {target}"),
            EntityKind::Ref { target } => format!("REF, {target}"),
            EntityKind::Scalar { ty, template } => format!("{ty}, {template}"),
            // containers returned above
            EntityKind::Parent | EntityKind::Array => return,
        };

        if is_item {
            out.push_str(&format!("{indent}- {detail}\n"));
        } else {
            out.push_str(&format!("{indent}{}: {detail}\n", self.name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_child_is_rejected() {
        let mut parent = Entity::parent("employee");
        parent
            .add_child(Entity::scalar("id", ValueType::Num, "func.num(5)"))
            .unwrap();
        let result = parent.add_child(Entity::scalar("id", ValueType::Str, "x"));
        assert!(matches!(result, Err(ModelError::DuplicateChild { .. })));
    }

    #[test]
    fn scalar_cannot_have_children() {
        let mut leaf = Entity::scalar("name", ValueType::Str, "func.sample(names)");
        let result = leaf.add_child(Entity::scalar("x", ValueType::Str, "y"));
        assert!(matches!(result, Err(ModelError::InvalidEntity { .. })));
    }

    #[test]
    fn pretty_outline_skips_unnamed_root() {
        let mut root = Entity::parent("");
        let mut emp = Entity::parent("employee");
        emp.add_child(Entity::scalar("id", ValueType::Num, "func.num(3)"))
            .unwrap();
        root.add_child(emp).unwrap();
        assert_eq!(root.pretty(), "employee:\n  id: NUM, func.num(3)\n");
    }

    #[test]
    fn repeat_takes_last_segment_name() {
        let repeat = Entity::repeat("employee.address", 1, 3);
        assert_eq!(repeat.name, "~address");
        assert!(matches!(
            repeat.kind,
            EntityKind::Repeat { ref target, min: 1, max: 3 } if target == "employee.address"
        ));
    }
}

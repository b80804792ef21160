use serde::{Deserialize, Serialize};

use crate::entity::{NULL_VALUE, ValueType};
use crate::error::{ModelError, Result};
use crate::sample::Gender;

/// Values carrying this prefix are emitted verbatim (pre-rendered JSON).
pub const OBJ_PREFIX: &str = "#obj!#:";

/// Output dialects that decide how a value is quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    Json,
    Sql,
}

/// A bottom-level attribute, before or after resolution.
///
/// The gender records whether a gendered sample participated in the
/// resolution, so sibling attributes can stay consistent with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub name: Option<String>,
    pub ty: ValueType,
    pub template: String,
    value: Option<String>,
    gender: Gender,
}

impl ResolvedValue {
    pub fn new(name: Option<String>, ty: ValueType, template: impl Into<String>) -> Self {
        Self {
            name,
            ty,
            template: template.into(),
            value: None,
            gender: Gender::Neutral,
        }
    }

    /// Shorthand for a value that needs no resolution.
    pub fn literal(name: Option<String>, ty: ValueType, value: &str) -> Self {
        let mut resolved = Self::new(name, ty, value);
        resolved.set_value(value.to_string(), Gender::Neutral);
        resolved
    }

    pub fn set_value(&mut self, value: String, gender: Gender) {
        self.value = Some(value);
        self.gender = gender;
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn require_value(&self) -> Result<&str> {
        self.value.as_deref().ok_or_else(|| {
            ModelError::Unresolved(self.name.clone().unwrap_or_else(|| self.template.clone()))
        })
    }

    /// Renders the resolved value for output. Str and Date values are
    /// quoted for the dialect; everything else passes through bare.
    pub fn rendered(&self, quoting: Quoting) -> Result<String> {
        let value = self.require_value()?;

        if value == NULL_VALUE {
            return Ok("null".to_string());
        }

        if !matches!(self.ty, ValueType::Str | ValueType::Date) {
            return Ok(value.to_string());
        }

        match quoting {
            Quoting::Sql => Ok(format!("'{}'", value.replace('\'', "''"))),
            Quoting::Json => {
                if let Some(raw) = value.strip_prefix(OBJ_PREFIX) {
                    Ok(raw.to_string())
                } else {
                    Ok(format!("\"{}\"", value.replace('"', "\\\"")))
                }
            }
        }
    }
}

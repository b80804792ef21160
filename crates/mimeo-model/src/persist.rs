use crate::api::ApiBody;
use crate::cache::Cache;
use crate::error::{ModelError, Result};

/// A persistence template in its defined form, e.g.
/// `employees/emp_{id}.json`, with its variables extracted.
///
/// The directory part is kept verbatim; variables are only substituted
/// in the filename part. The wildcard pattern is the filename with every
/// variable replaced by `*`, used to enumerate stored records.
#[derive(Debug, Clone)]
pub struct Persistence {
    def: String,
    folder: String,
    pattern: String,
    wild_pattern: String,
    vars: Vec<String>,
}

impl Persistence {
    pub fn new(def: &str) -> Result<Self> {
        let bad = |reason: &str| ModelError::BadPersist {
            def: def.to_string(),
            reason: reason.to_string(),
        };

        let vars = extract_vars(def).map_err(bad)?;

        let (folder, pattern) = match def.rsplit_once('/') {
            Some((folder, pattern)) => (folder.to_string(), pattern.to_string()),
            None => (String::new(), def.to_string()),
        };

        let wild_pattern = wildcardize(&pattern);
        if !wild_pattern.contains('*') {
            return Err(bad(
                "must contain at least one variable '{xxx}' or wildcard '*'",
            ));
        }

        Ok(Self {
            def: def.to_string(),
            folder,
            pattern,
            wild_pattern,
            vars,
        })
    }

    pub fn def(&self) -> &str {
        &self.def
    }

    /// Directory part of the template, relative to the store root.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Filename pattern with variables replaced by `*`.
    pub fn wild_pattern(&self) -> &str {
        &self.wild_pattern
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Substitutes every `{var}` in the filename with a concrete value
    /// and returns the store-relative path.
    ///
    /// Lookup order for each variable: namespaced names (`path.`,
    /// `query.`, `request.`) straight from the cache; otherwise the
    /// response attribute, then the request attribute, then a response
    /// value mod (literal or `~`-reference). A variable that matches
    /// nothing fails the whole operation.
    pub fn insert_vars(
        &self,
        cache: &Cache,
        request: Option<&ApiBody>,
        response: Option<&ApiBody>,
    ) -> Result<String> {
        let mut filled = String::new();
        let mut rest = self.pattern.as_str();

        while let Some(start) = rest.find('{') {
            // extract_vars already validated the braces
            let end = rest[start..].find('}').map(|p| start + p).ok_or_else(|| {
                ModelError::BadPersist {
                    def: self.def.clone(),
                    reason: "mismatched braces, missing '}'".into(),
                }
            })?;

            filled.push_str(&rest[..start]);
            let name = &rest[start + 1..end];

            let value = self
                .lookup_var(name, cache, request, response)
                .ok_or_else(|| ModelError::PersistVar {
                    def: self.def.clone(),
                    var: name.to_string(),
                })?;
            filled.push_str(&value);

            rest = &rest[end + 1..];
        }
        filled.push_str(rest);

        if self.folder.is_empty() {
            Ok(filled)
        } else {
            Ok(format!("{}/{filled}", self.folder))
        }
    }

    fn lookup_var(
        &self,
        name: &str,
        cache: &Cache,
        request: Option<&ApiBody>,
        response: Option<&ApiBody>,
    ) -> Option<String> {
        let direct = if name.starts_with("path.")
            || name.starts_with("query.")
            || name.starts_with("request.")
        {
            cache.get(name)
        } else {
            response
                .and_then(|r| cache.get(&format!("{}.{name}", r.entity_name)))
                .or_else(|| match request {
                    Some(request) => {
                        cache.get(&format!("request.{}.{name}", request.entity_name))
                    }
                    None => cache.get(name),
                })
        };

        if let Some(resolved) = direct {
            return resolved.value().map(str::to_string);
        }

        // The variable may be supplied by a response mod instead.
        let response = response?;
        let mod_value = response.mod_value(&format!("{}.{name}", response.entity_name))?;
        match mod_value.strip_prefix('~') {
            Some(reference) => cache.get(reference)?.value().map(str::to_string),
            None => Some(mod_value.to_string()),
        }
    }
}

/// Replaces each `{var}` with `*`, leaving everything else intact.
fn wildcardize(pattern: &str) -> String {
    let mut out = String::new();
    let mut rest = pattern;

    while let Some(start) = rest.find('{') {
        let end = match rest[start..].find('}') {
            Some(p) => start + p,
            None => break,
        };
        out.push_str(&rest[..start]);
        out.push('*');
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Pulls the `{var}` names out of the template, validating the braces
/// and the characters allowed in a name.
fn extract_vars(def: &str) -> std::result::Result<Vec<String>, &'static str> {
    let mut vars: Vec<String> = Vec::new();
    let mut chars = def.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        ' ' | '/' | '\\' => {
                            return Err("variable name must not include space, slash or backslash");
                        }
                        '{' => return Err("contains mismatched braces, found '{' but no '}'"),
                        c => name.push(c),
                    }
                }

                if !closed {
                    return Err("contains mismatched braces, found '{' but no '}'");
                }
                if name.is_empty() {
                    return Err("variable name must not be empty");
                }
                if !vars.contains(&name) {
                    vars.push(name);
                }
            }
            '}' => return Err("contains mismatched braces, found '}' but no '{'"),
            _ => {}
        }
    }

    Ok(vars)
}

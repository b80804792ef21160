//! Renders entity hierarchies to JSON, SQL insert statements or CSV.
//!
//! JSON output is the relaxed form used throughout: unquoted keys,
//! `key: value` pairs joined with comma-space. SQL and CSV need flat
//! structures and expand a top-level repeat into one row per instance.

use csv::{QuoteStyle, WriterBuilder};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use mimeo_model::{
    ApiBody, Cache, Entity, EntityKind, ModelError, NULL_VALUE, Quoting, ResolvedValue,
};

use crate::error::{EngineError, EngineResult};
use crate::resolver::Resolver;

/// Nesting depth after which rendering is declared circular. Kept low
/// enough that the error returns before recursion exhausts the stack.
const MAX_DEPTH: usize = 100;

pub struct Formatter<'a> {
    resolver: &'a Resolver,
}

impl<'a> Formatter<'a> {
    pub fn new(resolver: &'a Resolver) -> Self {
        Self { resolver }
    }

    /// Renders the entity as relaxed JSON, resolving every scalar along
    /// the way. Mods come from the API body definition: omit mods drop
    /// attributes, the wildcard mod redirects values to cache keys.
    pub fn entity_to_json(
        &self,
        entity: &Entity,
        cache: &mut Cache,
        mods: Option<&ApiBody>,
        rng: &mut ChaCha8Rng,
    ) -> EngineResult<String> {
        self.to_json(None, entity, cache, mods, 0, "", rng)
    }

    fn to_json(
        &self,
        parent: Option<&str>,
        entity: &Entity,
        cache: &mut Cache,
        mods: Option<&ApiBody>,
        depth: usize,
        known_name: &str,
        rng: &mut ChaCha8Rng,
    ) -> EngineResult<String> {
        let known_name = if known_name.is_empty() {
            &entity.name
        } else {
            known_name
        };

        // Repeat instances pass their indexed parent (`x.~N`); the child
        // object's attributes hang directly off that name.
        let full_name = match parent {
            Some(p) => match p.rsplit_once('.') {
                Some((_, last))
                    if last.starts_with('~') && matches!(entity.kind, EntityKind::Parent) =>
                {
                    p.to_string()
                }
                _ => format!("{p}.{}", entity.name),
            },
            None => entity.name.clone(),
        };

        // An exact mod on the attribute shadows the wildcard.
        let mut wildcard = None;
        if let Some(body) = mods {
            if body.omitted(&full_name) {
                return Ok(String::new());
            }
            if body.mod_value(&full_name).is_none() {
                wildcard = body.wildcard();
            }
        }

        // Checked on every frame, root included, so a self-referencing
        // entity errors instead of recursing until the stack runs out.
        if depth > MAX_DEPTH {
            return Err(EngineError::TooDeep(match parent {
                Some(parent) => parent.to_string(),
                None => full_name.clone(),
            }));
        }

        let is_array_child = known_name.starts_with('~') || known_name.starts_with('#');
        let mut out = String::new();

        match &entity.kind {
            EntityKind::Parent | EntityKind::Array => {
                if parent.is_some() && !is_array_child {
                    out.push_str(&format!("{}: ", entity.name));
                }

                let (open, close) = if matches!(entity.kind, EntityKind::Parent) {
                    ("{", "}")
                } else {
                    ("[", "]")
                };
                out.push_str(open);

                let mut first = true;
                for child in entity.children() {
                    let rendered =
                        self.to_json(Some(&full_name), child, cache, mods, depth + 1, "", rng)?;
                    if rendered.is_empty() {
                        continue;
                    }
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    out.push_str(&rendered);
                }

                out.push_str(close);
            }
            EntityKind::Ref { target } => {
                let ref_entity =
                    self.resolver
                        .find_entity(target)
                        .map_err(|e| EngineError::BadReference {
                            name: known_name.to_string(),
                            target: target.clone(),
                            message: e.to_string(),
                        })?;

                let ref_parent = if wildcard.is_some() {
                    Some(full_name.as_str())
                } else {
                    None
                };

                // The target renders under this attribute's name, not its
                // own: repeats get a `#` tag so the array branch prints
                // it, containers get the key here with printing inside
                // suppressed, scalars print it themselves.
                let known = match ref_entity.kind {
                    EntityKind::Repeat { .. } => format!("#{known_name}"),
                    EntityKind::Parent | EntityKind::Array => {
                        if !is_array_child {
                            out.push_str(&format!("{known_name}: "));
                        }
                        format!("~{known_name}")
                    }
                    _ => known_name.to_string(),
                };

                out.push_str(&self.to_json(
                    ref_parent,
                    &ref_entity,
                    cache,
                    mods,
                    depth + 1,
                    &known,
                    rng,
                )?);
            }
            EntityKind::Repeat { target, min, max } => {
                if let Some(stripped) = known_name.strip_prefix('#') {
                    out.push_str(&format!("{stripped}: "));
                }

                let ref_entity =
                    self.resolver
                        .find_entity(target)
                        .map_err(|e| EngineError::BadReference {
                            name: known_name.to_string(),
                            target: target.clone(),
                            message: e.to_string(),
                        })?;

                // A `~`-valued wildcard means the instances come from the
                // cache (a flattened request or stored record), so the
                // count is however many indexed entries exist.
                let driven = wildcard.and_then(|w| w.strip_prefix('~')).map(|source| {
                    let mod_parent = match parent {
                        Some(p) => format!("{p}.~"),
                        None => format!("{target}.~"),
                    };
                    let group = format!("{source}.{mod_parent}");
                    let mut count = 0usize;
                    while cache.has(&format!("{group}{}", count + 1)) {
                        count += 1;
                    }
                    (mod_parent, count)
                });

                out.push('[');
                match driven {
                    Some((mod_parent, count)) => {
                        for i in 0..count {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            let instance = format!("{mod_parent}{}", i + 1);
                            out.push_str(&self.to_json(
                                Some(&instance),
                                &ref_entity,
                                cache,
                                mods,
                                depth + 1,
                                known_name,
                                rng,
                            )?);
                        }
                    }
                    None => {
                        let count = rng.random_range(*min..=*max);
                        for i in 0..count {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            // Fresh cache per instance keeps them unrelated.
                            let mut fresh = Cache::new();
                            out.push_str(&self.to_json(
                                None,
                                &ref_entity,
                                &mut fresh,
                                mods,
                                depth + 1,
                                known_name,
                                rng,
                            )?);
                        }
                    }
                }
                out.push(']');
            }
            EntityKind::Scalar { ty, template } => {
                if !is_array_child {
                    out.push_str(&format!("{known_name}: "));
                }

                let mut resolving = None;
                if let Some(w) = wildcard {
                    let key = format!("{w}.{full_name}");
                    let key = key.strip_prefix('~').unwrap_or(&key);

                    match cache.get(key) {
                        Some(hit) => resolving = Some(hit.clone()),
                        None => {
                            // Request and query values are optional.
                            if !key.starts_with("request.") && !key.starts_with("query.") {
                                return Err(
                                    ModelError::AttributeNotFound(key.to_string()).into()
                                );
                            }
                        }
                    }
                }

                let resolving = match resolving {
                    Some(resolving) => resolving,
                    None => {
                        let mut value =
                            ResolvedValue::new(Some(full_name), *ty, template.clone());
                        self.resolver.resolve(&mut value, cache, rng)?;
                        value
                    }
                };

                out.push_str(&resolving.rendered(Quoting::Json)?);
            }
        }

        Ok(out)
    }

    /// One `INSERT INTO ... VALUES (...);` statement per instance.
    pub fn entity_to_sql(&self, entity: &Entity, rng: &mut ChaCha8Rng) -> EngineResult<String> {
        let (table, attributes, count) = self.flat_attributes(entity, rng)?;

        let columns = attributes
            .iter()
            .map(|a| format!("'{}'", column_name(a)))
            .collect::<Vec<_>>()
            .join(",");

        let mut out = String::new();
        for _ in 0..count {
            let mut cache = Cache::new();
            let mut values = Vec::with_capacity(attributes.len());
            for attribute in &attributes {
                let mut value = attribute.clone();
                self.resolver.resolve(&mut value, &mut cache, rng)?;
                values.push(value.rendered(Quoting::Sql)?);
            }
            out.push_str(&format!(
                "INSERT INTO {table} ({columns}) VALUES ({});\n",
                values.join(",")
            ));
        }

        Ok(out)
    }

    /// A quoted header row followed by one quoted row per instance.
    pub fn entity_to_csv(&self, entity: &Entity, rng: &mut ChaCha8Rng) -> EngineResult<String> {
        let (_, attributes, count) = self.flat_attributes(entity, rng)?;

        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(Vec::new());

        writer.write_record(attributes.iter().map(column_name))?;

        for _ in 0..count {
            let mut cache = Cache::new();
            let mut row = Vec::with_capacity(attributes.len());
            for attribute in &attributes {
                let mut value = attribute.clone();
                self.resolver.resolve(&mut value, &mut cache, rng)?;
                let value = value.require_value()?;
                row.push(if value == NULL_VALUE {
                    "null".to_string()
                } else {
                    value.to_string()
                });
            }
            writer.write_record(&row)?;
        }

        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Collects the scalar attributes for tabular output, expanding a
    /// single top-level repeat into its instance count.
    fn flat_attributes(
        &self,
        entity: &Entity,
        rng: &mut ChaCha8Rng,
    ) -> EngineResult<(String, Vec<ResolvedValue>, i64)> {
        let mut attributes = Vec::new();
        let repeating = self.add_attributes(&mut attributes, None, entity, "")?;

        let mut table = entity.name.clone();
        let mut count = 1;

        if let Some((target, min, max)) = repeating {
            let target_entity =
                self.resolver
                    .find_entity(&target)
                    .map_err(|e| EngineError::BadReference {
                        name: entity.name.clone(),
                        target: target.clone(),
                        message: e.to_string(),
                    })?;

            if self
                .add_attributes(&mut attributes, None, &target_entity, &entity.name)?
                .is_some()
            {
                return Err(EngineError::NotFlat {
                    name: entity.name.clone(),
                    format: "SQL or CSV",
                    reason: format!("'{target}' contains nested repeats"),
                });
            }

            count = rng.random_range(min..=max);
            table = match target.rsplit_once('.') {
                Some((head, _)) => head.to_string(),
                None => target,
            };
        }

        Ok((table, attributes, count))
    }

    /// Returns the repeat definition when the top-level entity is one.
    fn add_attributes(
        &self,
        attributes: &mut Vec<ResolvedValue>,
        parent: Option<&str>,
        entity: &Entity,
        entity_name: &str,
    ) -> EngineResult<Option<(String, i64, i64)>> {
        let full_name = match parent {
            Some(p) => format!("{p}.{}", entity.name),
            None => entity.name.clone(),
        };
        let entity_name = if entity_name.is_empty() {
            &entity.name
        } else {
            entity_name
        };

        match &entity.kind {
            EntityKind::Parent if attributes.is_empty() => {
                for child in entity.children() {
                    self.add_attributes(attributes, Some(&full_name), child, "")?;
                }
                Ok(None)
            }
            EntityKind::Repeat { target, min, max } if attributes.is_empty() => {
                Ok(Some((target.clone(), *min, *max)))
            }
            EntityKind::Parent | EntityKind::Array | EntityKind::Repeat { .. } => {
                Err(EngineError::NotFlat {
                    name: entity.name.clone(),
                    format: "SQL or CSV",
                    reason: "it has children. Only flat structures can be output in these formats"
                        .to_string(),
                })
            }
            EntityKind::Ref { target } => {
                let ref_entity =
                    self.resolver
                        .find_entity(target)
                        .map_err(|e| EngineError::BadReference {
                            name: entity_name.to_string(),
                            target: target.clone(),
                            message: e.to_string(),
                        })?;
                self.add_attributes(attributes, None, &ref_entity, entity_name)
            }
            EntityKind::Scalar { ty, template } => {
                attributes.push(ResolvedValue::new(Some(full_name), *ty, template.clone()));
                Ok(None)
            }
        }
    }
}

/// Column name for tabular output: the last dotted segment, with a
/// leading `~` stripped off undotted repeat names.
fn column_name(attribute: &ResolvedValue) -> String {
    let name = attribute.name.as_deref().unwrap_or_default();
    match name.rsplit_once('.') {
        Some((_, last)) => last.to_string(),
        None => name.strip_prefix('~').unwrap_or(name).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use rand::SeedableRng;

    use mimeo_model::{ApiService, ValueType};
    use mimeo_schema::{SampleSource, SchemaError, SchemaResult, parse_samples};
    use mimeo_model::Samples;

    struct MapSource(HashMap<String, String>);

    impl SampleSource for MapSource {
        fn load(&self, name: &str) -> SchemaResult<Samples> {
            let content = self.0.get(name).ok_or_else(|| SchemaError::Samples {
                name: name.to_string(),
                reason: "not found".into(),
            })?;
            parse_samples(name, content)
        }
    }

    fn test_resolver() -> Resolver {
        let mut employee = Entity::parent("employee");
        employee
            .add_child(Entity::scalar("id", ValueType::Num, "func.num(3)"))
            .unwrap();
        employee
            .add_child(Entity::scalar("name", ValueType::Str, "Bob"))
            .unwrap();
        employee
            .add_child(Entity::scalar("active", ValueType::Bool, "true"))
            .unwrap();

        let mut department = Entity::parent("department");
        department
            .add_child(Entity::scalar("title", ValueType::Str, "Sales"))
            .unwrap();
        department
            .add_child(Entity::reference("head", "employee"))
            .unwrap();
        department
            .add_child(Entity::reference("staff", "[employee, 2]"))
            .unwrap();

        let mut service = ApiService::new();
        service.root.add_child(employee).unwrap();
        service.root.add_child(department).unwrap();

        Resolver::new(service, Box::new(MapSource(HashMap::new())))
    }

    fn render(
        resolver: &Resolver,
        entity_def: &str,
        mods: Option<&ApiBody>,
        cache: &mut Cache,
        seed: u64,
    ) -> String {
        let entity = resolver.find_entity(entity_def).unwrap();
        let formatter = Formatter::new(resolver);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        formatter
            .entity_to_json(&entity, cache, mods, &mut rng)
            .unwrap()
    }

    #[test]
    fn object_renders_with_relaxed_keys() {
        let resolver = test_resolver();
        let json = render(&resolver, "employee", None, &mut Cache::new(), 1);

        assert!(json.starts_with('{') && json.ends_with('}'), "{json}");
        assert!(json.contains("id: "), "{json}");
        assert!(json.contains("name: \"Bob\""), "{json}");
        assert!(json.contains("active: true"), "{json}");
    }

    #[test]
    fn rendered_json_reparses_to_the_same_output() {
        let mut record = Entity::parent("record");
        record
            .add_child(Entity::scalar("first", ValueType::Str, "x"))
            .unwrap();
        record
            .add_child(Entity::scalar("second", ValueType::Num, "5"))
            .unwrap();

        let mut service = ApiService::new();
        service.root.add_child(record).unwrap();
        let resolver = Resolver::new(service, Box::new(MapSource(HashMap::new())));

        let json = render(&resolver, "record", None, &mut Cache::new(), 1);
        assert_eq!(json, "{first: \"x\", second: 5}");

        let reparsed = mimeo_schema::entity_from_json("record", &json).unwrap();
        let formatter = Formatter::new(&resolver);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let again = formatter
            .entity_to_json(&reparsed, &mut Cache::new(), None, &mut rng)
            .unwrap();
        assert_eq!(again, json);
    }

    #[test]
    fn nested_refs_render_inline() {
        let resolver = test_resolver();
        let json = render(&resolver, "department", None, &mut Cache::new(), 2);

        assert!(json.contains("title: \"Sales\""), "{json}");
        assert!(json.contains("head: {"), "{json}");
        // The ref to a repeat renders as a named array of two objects.
        assert!(json.contains("staff: [{"), "{json}");
        assert_eq!(json.matches("name: \"Bob\"").count(), 3, "{json}");
    }

    #[test]
    fn omit_mod_drops_the_attribute() {
        let resolver = test_resolver();
        let mods = ApiBody::parse("employee, !name").unwrap();
        let json = render(&resolver, "employee", Some(&mods), &mut Cache::new(), 1);

        assert!(!json.contains("name"), "{json}");
        assert!(!json.contains(", ,"), "{json}");
    }

    #[test]
    fn repeat_count_stays_in_range() {
        let resolver = test_resolver();
        for seed in 0..20 {
            let json = render(&resolver, "[employee, 2-4]", None, &mut Cache::new(), seed);
            let count = json.matches("id: ").count();
            assert!((2..=4).contains(&count), "{json}");
        }
    }

    #[test]
    fn repeat_instances_are_independent() {
        let resolver = test_resolver();
        let json = render(&resolver, "[employee, 2]", None, &mut Cache::new(), 3);

        // Both instances resolved with their own cache; both rendered.
        assert_eq!(json.matches("id: ").count(), 2, "{json}");
        assert!(json.starts_with('[') && json.ends_with(']'), "{json}");
    }

    #[test]
    fn wildcard_mod_pulls_values_from_the_cache() {
        let resolver = test_resolver();
        let mods = ApiBody::parse("employee, *=~request").unwrap();

        let mut cache = Cache::new();
        cache.add_resolved("request.employee.id", "7");
        cache.add_resolved("request.employee.name", "Ann");
        cache.add_resolved("request.employee.active", "false");

        let json = render(&resolver, "employee", Some(&mods), &mut cache, 1);
        assert!(json.contains("id: \"7\""), "{json}");
        assert!(json.contains("name: \"Ann\""), "{json}");
    }

    #[test]
    fn wildcard_misses_fall_back_to_generation() {
        let resolver = test_resolver();
        let mods = ApiBody::parse("employee, *=~request").unwrap();

        let mut cache = Cache::new();
        cache.add_resolved("request.employee.name", "Ann");

        // id and active are absent from the request, so they generate.
        let json = render(&resolver, "employee", Some(&mods), &mut cache, 1);
        assert!(json.contains("name: \"Ann\""), "{json}");
        assert!(json.contains("active: true"), "{json}");
    }

    #[test]
    fn wildcard_repeat_count_comes_from_the_cache() {
        let resolver = test_resolver();
        let mods = ApiBody::parse("[employee], *=~request").unwrap();

        let mut cache = Cache::new();
        for i in 1..=2 {
            cache.add_resolved(&format!("request.employee.~{i}"), "repeat");
            cache.add_resolved(&format!("request.employee.~{i}.id"), &i.to_string());
            cache.add_resolved(&format!("request.employee.~{i}.name"), "Ann");
            cache.add_resolved(&format!("request.employee.~{i}.active"), "true");
        }

        let json = render(&resolver, "[employee]", Some(&mods), &mut cache, 1);
        assert!(json.contains("id: \"1\""), "{json}");
        assert!(json.contains("id: \"2\""), "{json}");
        assert_eq!(json.matches("name: \"Ann\"").count(), 2, "{json}");
    }

    #[test]
    fn self_referencing_entity_hits_the_depth_limit() {
        let mut node = Entity::parent("node");
        node.add_child(Entity::reference("next", "node")).unwrap();

        let mut service = ApiService::new();
        service.root.add_child(node).unwrap();
        let resolver = Resolver::new(service, Box::new(MapSource(HashMap::new())));

        let entity = resolver.find_entity("node").unwrap();
        let formatter = Formatter::new(&resolver);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = formatter.entity_to_json(&entity, &mut Cache::new(), None, &mut rng);
        assert!(matches!(result, Err(EngineError::TooDeep(_))));
    }

    #[test]
    fn sql_emits_one_insert_per_instance() {
        let resolver = test_resolver();
        let entity = resolver.find_entity("[employee, 2]").unwrap();
        let formatter = Formatter::new(&resolver);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let sql = formatter.entity_to_sql(&entity, &mut rng).unwrap();
        let lines: Vec<&str> = sql.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            assert!(
                line.starts_with("INSERT INTO employee ('id','name','active') VALUES ("),
                "{line}"
            );
            assert!(line.contains("'Bob'"), "{line}");
            assert!(line.ends_with(");"), "{line}");
        }
    }

    #[test]
    fn csv_has_header_and_quoted_rows() {
        let resolver = test_resolver();
        let entity = resolver.find_entity("employee").unwrap();
        let formatter = Formatter::new(&resolver);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let csv = formatter.entity_to_csv(&entity, &mut rng).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "\"id\",\"name\",\"active\"");
        assert!(lines[1].contains("\"Bob\""), "{}", lines[1]);
    }

    #[test]
    fn nested_structures_cannot_go_tabular() {
        let resolver = test_resolver();
        let entity = resolver.find_entity("department").unwrap();
        let formatter = Formatter::new(&resolver);
        let mut rng = ChaCha8Rng::seed_from_u64(6);

        let result = formatter.entity_to_sql(&entity, &mut rng);
        assert!(matches!(result, Err(EngineError::NotFlat { .. })));
    }
}

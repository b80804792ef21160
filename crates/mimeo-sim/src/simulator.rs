//! Dispatches simulated API calls: route matching, request ingestion,
//! response generation and persisted-record read/write/delete.

use std::sync::{PoisonError, RwLock};

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use mimeo_engine::{Formatter, Resolver};
use mimeo_model::{Api, Cache, Entity, EntityKind, Method};
use mimeo_schema::entity_from_json;

use crate::error::{SimError, SimResult};
use crate::store::FileStore;

pub struct Simulator {
    // Swapped wholesale on reload; calls in flight finish against the
    // schema they started with.
    resolver: RwLock<Resolver>,
    store: FileStore,
}

impl Simulator {
    pub fn new(resolver: Resolver, store: FileStore) -> Self {
        Self {
            resolver: RwLock::new(resolver),
            store,
        }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Replaces the loaded schema. Callers validate the new schema
    /// before handing it over, so a failed load never gets this far.
    pub fn reload(&self, resolver: Resolver) {
        let mut current = self
            .resolver
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = resolver;
        info!("schema reloaded");
    }

    /// Renders a sample request body for the matched API, useful for
    /// exploring what a route expects to receive.
    pub fn get_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        rng: &mut ChaCha8Rng,
    ) -> SimResult<String> {
        let resolver = self.resolver.read().unwrap_or_else(PoisonError::into_inner);

        let (api, mut cache) = resolver
            .match_route(method, path)
            .ok_or_else(|| SimError::NotFound(format!("no API matches {method} {path}")))?;

        for (key, value) in query {
            cache.add_resolved(&format!("query.{key}"), value);
        }

        let request = api.request.as_ref().ok_or_else(|| {
            SimError::BadRequest("the called API does not have a request defined".into())
        })?;

        let entity = resolver
            .find_entity(&request.entity_def)
            .map_err(|e| SimError::BadRequest(format!("request entity {e}")))?;

        let formatter = Formatter::new(&resolver);
        Ok(formatter.entity_to_json(&entity, &mut cache, Some(request), rng)?)
    }

    /// Handles one simulated call and returns the response body, if the
    /// API defines one.
    pub fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&str>,
        rng: &mut ChaCha8Rng,
    ) -> SimResult<Option<String>> {
        let resolver = self.resolver.read().unwrap_or_else(PoisonError::into_inner);

        let (api, mut cache) = resolver
            .match_route(method, path)
            .ok_or_else(|| SimError::NotFound(format!("no API matches {method} {path}")))?;

        for (key, value) in query {
            cache.add_resolved(&format!("query.{key}"), value);
        }

        self.ingest_request(api, body, &mut cache)?;

        let response = match &api.response {
            Some(response) => Some(
                resolver
                    .find_entity(&response.entity_def)
                    .map_err(|e| SimError::BadRequest(format!("response entity {e}")))?,
            ),
            None => None,
        };

        let formatter = Formatter::new(&resolver);

        let Some(persist) = &api.persist else {
            // Plain generation, nothing stored.
            return match (&response, &api.response) {
                (Some(entity), Some(spec)) => Ok(Some(formatter.entity_to_json(
                    entity,
                    &mut cache,
                    Some(spec),
                    rng,
                )?)),
                _ => Ok(None),
            };
        };

        if api.method == Method::Get {
            let Some(entity) = &response else {
                return Ok(None);
            };

            if matches!(entity.kind, EntityKind::Repeat { .. }) {
                // Array responses come straight from the stored records.
                let mut out = String::from("[");
                let files = self.store.list(persist.folder(), persist.wild_pattern())?;
                for (i, file) in files.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.load_record(&formatter, api, file, &mut cache, false, rng)?);
                }
                out.push(']');
                return Ok(Some(out));
            }

            let filename = persist
                .insert_vars(&cache, api.request.as_ref(), api.response.as_ref())
                .map_err(|e| SimError::BadRequest(e.to_string()))?;

            // A wildcard left in the addressed name means any matching
            // record will do; values derived from the call overwrite
            // what was stored, so the record must be re-rendered.
            if filename.contains('*') {
                let (folder, pattern) = match filename.rsplit_once('/') {
                    Some((folder, pattern)) => (folder, pattern),
                    None => ("", filename.as_str()),
                };
                let files = self.store.list(folder, pattern)?;
                if files.is_empty() {
                    return Err(SimError::NotFound(format!("no record matches '{filename}'")));
                }
                let file = files[rng.random_range(0..files.len())].clone();
                return Ok(Some(self.load_record(&formatter, api, &file, &mut cache, true, rng)?));
            }

            if !self.store.exists(&filename) {
                return Err(SimError::NotFound(format!("record '{filename}' not found")));
            }
            return Ok(Some(self.load_record(&formatter, api, &filename, &mut cache, false, rng)?));
        }

        // Mutating persisted call: render first, then store or delete.
        let json = match (&response, &api.response) {
            (Some(entity), Some(spec)) => {
                Some(formatter.entity_to_json(entity, &mut cache, Some(spec), rng)?)
            }
            _ => None,
        };

        let filename = persist
            .insert_vars(&cache, api.request.as_ref(), api.response.as_ref())
            .map_err(|e| SimError::BadRequest(e.to_string()))?;

        if api.method == Method::Delete {
            self.store.delete(&filename)?;
        } else {
            self.store.write(&filename, json.as_deref().unwrap_or_default())?;
        }

        Ok(json)
    }

    /// Validates the body against the API's request spec and flattens
    /// it into the cache under `request.*`, backfilling declared
    /// request mods the body left out.
    fn ingest_request(&self, api: &Api, body: Option<&str>, cache: &mut Cache) -> SimResult<()> {
        let Some(body) = body else {
            if api.request.is_some() {
                return Err(SimError::BadRequest(
                    "request body was expected but not supplied".into(),
                ));
            }
            return Ok(());
        };

        let Some(request) = &api.request else {
            return Err(SimError::BadRequest(
                "request body was supplied but the called API does not define one".into(),
            ));
        };

        let entity = entity_from_json(&request.entity_name, body)
            .map_err(|e| SimError::BadRequest(format!("failed to parse request JSON: {e}")))?;
        flatten_request("request", &entity, cache);

        for (attr, value) in request.value_mods() {
            let key = format!("request.{attr}");
            if cache.has(&key) {
                continue;
            }
            match value.strip_prefix('~') {
                Some(reference) => {
                    // Reference mods only backfill when the referenced
                    // value is already in the cache.
                    let hit = cache
                        .get(reference)
                        .and_then(|hit| hit.value().map(str::to_string));
                    if let Some(v) = hit {
                        cache.add_resolved(&key, &v);
                    }
                }
                None => cache.add_resolved(&key, value),
            }
        }

        Ok(())
    }

    /// Reads one stored record. Records carrying unresolved function
    /// templates are re-parsed and re-rendered; `force` re-renders
    /// unconditionally so cache-derived values replace stored ones.
    fn load_record(
        &self,
        formatter: &Formatter<'_>,
        api: &Api,
        file: &str,
        cache: &mut Cache,
        force: bool,
        rng: &mut ChaCha8Rng,
    ) -> SimResult<String> {
        let json = self.store.read(file)?;

        if !force && !json.contains("func.") {
            return Ok(json);
        }

        let spec = api.response.as_ref();
        let name = spec.map(|s| s.entity_name.as_str()).unwrap_or("response");
        let entity: Entity = entity_from_json(name, &json).map_err(|e| {
            SimError::BadRequest(format!("failed to parse JSON in record '{file}': {e}"))
        })?;

        Ok(formatter.entity_to_json(&entity, cache, spec, rng)?)
    }
}

/// Flattens a parsed request body into `parent.<path>` cache keys.
/// Array and repeat-shaped parents leave a `repeat` sentinel so the
/// formatter can count instances.
fn flatten_request(parent: &str, entity: &Entity, cache: &mut Cache) {
    let full = format!("{parent}.{}", entity.name);

    match &entity.kind {
        EntityKind::Parent | EntityKind::Array => {
            if entity.name.starts_with('~') {
                cache.add_resolved(&full, "repeat");
            }
            for child in entity.children() {
                flatten_request(&full, child, cache);
            }
        }
        EntityKind::Scalar { template, .. } => {
            cache.add_resolved(&full, template);
        }
        EntityKind::Ref { .. } | EntityKind::Repeat { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mimeo_model::ValueType;

    #[test]
    fn request_flattening_marks_array_instances() {
        let entity = entity_from_json(
            "employee",
            r#"{id: 5, phones: [{num: "1"}, {num: "2"}], tag: null}"#,
        )
        .unwrap();

        let mut cache = Cache::new();
        flatten_request("request", &entity, &mut cache);

        assert_eq!(
            cache.get_value("request.employee.id").unwrap().value(),
            Some("5")
        );
        assert_eq!(
            cache
                .get_value("request.employee.phones.~1")
                .unwrap()
                .value(),
            Some("repeat")
        );
        assert_eq!(
            cache
                .get_value("request.employee.phones.~2.num")
                .unwrap()
                .value(),
            Some("2")
        );
        assert_eq!(
            cache.get_value("request.employee.tag").unwrap().value(),
            Some(mimeo_model::NULL_VALUE)
        );
    }

    #[test]
    fn top_level_array_bodies_flatten_with_indexes() {
        let entity = entity_from_json("employee", r#"[{id: 1}, {id: 2}]"#).unwrap();

        let mut cache = Cache::new();
        flatten_request("request", &entity, &mut cache);

        assert_eq!(
            cache.get_value("request.employee.~1").unwrap().value(),
            Some("repeat")
        );
        assert_eq!(
            cache.get_value("request.employee.~2.id").unwrap().value(),
            Some("2")
        );
        assert_eq!(
            cache.get_value("request.employee.~1.id").unwrap().ty,
            ValueType::Str
        );
    }
}

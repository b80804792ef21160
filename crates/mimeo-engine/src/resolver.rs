//! Turns value templates into concrete values.
//!
//! A template is plain text with embedded `func.NAME(args)` calls. The
//! resolver scans for calls, evaluates them through the registry and
//! appends the results to the output verbatim, memoizing named
//! attributes in the pass cache so later references see the same value.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rand_chacha::ChaCha8Rng;
use tracing::debug;

use mimeo_model::{
    Api, ApiService, Cache, Entity, EntityIndex, Gender, Method, ResolvedValue, Route, Samples,
};
use mimeo_schema::SampleSource;

use crate::error::{EngineError, EngineResult};
use crate::funcs::{FuncContext, FuncRegistry, FuncValue};

pub struct Resolver {
    service: ApiService,
    index: EntityIndex,
    funcs: FuncRegistry,
    source: Box<dyn SampleSource>,
    // Sample sets are immutable once parsed, so they load once and are
    // shared from then on.
    samples: RwLock<HashMap<String, Arc<Samples>>>,
}

impl Resolver {
    pub fn new(service: ApiService, source: Box<dyn SampleSource>) -> Self {
        let index = EntityIndex::from_root(&service.root);
        Self {
            service,
            index,
            funcs: FuncRegistry::new(),
            source,
            samples: RwLock::new(HashMap::new()),
        }
    }

    pub fn service(&self) -> &ApiService {
        &self.service
    }

    pub fn funcs(&self) -> &FuncRegistry {
        &self.funcs
    }

    /// Finds an entity by full dotted name, following ref links and
    /// expanding `[name, count]` references.
    pub fn find_entity(&self, full_name: &str) -> EngineResult<Entity> {
        Ok(self.index.find(full_name)?)
    }

    /// Matches an incoming method and path against the service's APIs.
    /// On a match the returned cache is seeded with the path variables.
    pub fn match_route(&self, method: Method, path: &str) -> Option<(&Api, Cache)> {
        let incoming = Route::new(path);
        for api in &self.service.apis {
            if api.method != method {
                continue;
            }
            if let Some(cache) = api.route.matches(&incoming) {
                return Some((api, cache));
            }
        }
        None
    }

    /// The named sample set, loaded on first use.
    pub fn samples(&self, name: &str) -> EngineResult<Arc<Samples>> {
        {
            let loaded = self.samples.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(samples) = loaded.get(name) {
                return Ok(Arc::clone(samples));
            }
        }

        let samples = Arc::new(self.source.load(name)?);
        let mut loaded = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            loaded.entry(name.to_string()).or_insert(samples),
        ))
    }

    /// Resolves a value in place. Named attributes are answered from the
    /// cache when already resolved this pass, and memoized otherwise.
    pub fn resolve(
        &self,
        resolving: &mut ResolvedValue,
        cache: &mut Cache,
        rng: &mut ChaCha8Rng,
    ) -> EngineResult<()> {
        let name = resolving.name.clone();

        let outcome = self.resolve_inner(resolving, cache, rng);
        match outcome {
            Ok(()) => Ok(()),
            // Anonymous values propagate raw so named callers wrap once.
            Err(e) => match name {
                Some(name) => Err(EngineError::Resolve {
                    name,
                    message: e.to_string(),
                }),
                None => Err(e),
            },
        }
    }

    fn resolve_inner(
        &self,
        resolving: &mut ResolvedValue,
        cache: &mut Cache,
        rng: &mut ChaCha8Rng,
    ) -> EngineResult<()> {
        if let Some(cached) = cache.get_resolved(resolving.name.as_deref())? {
            let value = cached.value().unwrap_or_default().to_string();
            resolving.set_value(value, cached.gender());
            return Ok(());
        }

        let template = resolving.template.clone();

        if find_func(&template).is_none() {
            resolving.set_value(template, Gender::Neutral);
            cache.set_resolved(resolving.clone());
            return Ok(());
        }

        let parent = resolving
            .name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(parent, _)| parent.to_string())
            .unwrap_or_default();

        let mut gender = Gender::Neutral;

        // Results go to a separate output buffer and scanning continues
        // on the remaining input only, so a produced value containing
        // `func.` is never re-interpreted as a call.
        let mut out = String::new();
        let mut rest = template.as_str();

        while let Some(start) = find_func(rest) {
            out.push_str(&rest[..start]);

            let after = start + "func.".len();

            let Some(open_offset) = rest[after..].find('(') else {
                return Err(EngineError::MissingOpenBracket(rest[after..].to_string()));
            };
            let open = after + open_offset;
            let func_name = rest[after..open].to_string();

            let close = find_close(rest, open)
                .ok_or_else(|| EngineError::MissingCloseBracket(func_name.clone()))?;

            // The argument list may itself contain function calls, so it
            // is resolved as a whole (anonymously, uncached) first.
            let mut args_value =
                ResolvedValue::new(None, mimeo_model::ValueType::Str, &rest[open + 1..close]);
            self.resolve(&mut args_value, cache, rng)?;
            let args_gender = args_value.gender();

            let arg_list = args_value
                .value()
                .unwrap_or_default()
                .replace("\\(", "(")
                .replace("\\)", ")")
                .trim()
                .to_string();
            let args = split_args(&arg_list);

            let result = self.eval(&func_name, &arg_list, &args, cache, &parent, rng)?;

            let eval_gender = if result.gender != Gender::Neutral {
                result.gender
            } else {
                args_gender
            };
            if eval_gender != Gender::Neutral {
                // The last gendered call in the template wins.
                gender = eval_gender;
            }

            out.push_str(&result.value);
            rest = &rest[close + 1..];
        }
        out.push_str(rest);

        debug!(name = resolving.name.as_deref(), value = %out, "resolved");
        resolving.set_value(out, gender);
        cache.set_resolved(resolving.clone());
        Ok(())
    }

    fn eval(
        &self,
        func_name: &str,
        arg_list: &str,
        args: &[String],
        cache: &mut Cache,
        parent: &str,
        rng: &mut ChaCha8Rng,
    ) -> EngineResult<FuncValue> {
        let func = self
            .funcs
            .get(func_name)
            .ok_or_else(|| EngineError::UnknownFunction {
                name: func_name.to_string(),
                known: self.funcs.known(),
            })?;

        if args.len() == 1 && args[0] == "--help" {
            return Ok(FuncValue::neutral(func.usage()));
        }

        let called = format!("func.{func_name}({arg_list})");
        let mut ctx = FuncContext {
            resolver: self,
            cache,
            parent,
            rng,
        };
        func.call(&called, args, &mut ctx)
    }
}

/// Position of the next `func.` marker, case-insensitively.
fn find_func(value: &str) -> Option<usize> {
    value
        .as_bytes()
        .windows(5)
        .position(|w| w.eq_ignore_ascii_case(b"func."))
}

/// Position of the bracket closing the one at `open`, honoring nesting
/// and `\(` / `\)` escapes.
fn find_close(value: &str, open: usize) -> Option<usize> {
    let bytes = value.as_bytes();
    let mut depth = 0i32;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Splits an argument list on commas outside double quotes. Quotes are
/// removed and each argument is trimmed.
fn split_args(arg_list: &str) -> Vec<String> {
    if arg_list.is_empty() {
        return Vec::new();
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in arg_list.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                args.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    args.push(current.trim().to_string());

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;

    use mimeo_model::{EntityKind, ValueType};
    use mimeo_schema::{SchemaError, SchemaResult, parse_samples};

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
        for (name, ty, template) in [
            ("id", ValueType::Num, "func.num(3)"),
            ("first", ValueType::Str, "func.sample(firstnames)"),
            ("title", ValueType::Str, "func.sample(titles, ~first)"),
            ("age", ValueType::Num, "func.rand(18-65)"),
            ("rate", ValueType::Num, "4.567"),
            ("retire_age", ValueType::Num, "func.math(~age, +5)"),
            ("loop_a", ValueType::Str, "func.ref(loop_b)"),
            ("loop_b", ValueType::Str, "func.ref(loop_a)"),
        ] {
            employee
                .add_child(Entity::scalar(name, ty, template))
                .unwrap();
        }

        let mut service = ApiService::new();
        service.root.add_child(employee).unwrap();

        let mut sets = HashMap::new();
        sets.insert(
            "firstnames".to_string(),
            "#Name, GENDER\nArthur, M\nBeth, F\n".to_string(),
        );
        sets.insert(
            "titles".to_string(),
            "#Title, GENDER\nMr, M\nMs, F\n".to_string(),
        );
        sets.insert("notes".to_string(), "pay func. later\n".to_string());

        Resolver::new(service, Box::new(MapSource(sets)))
    }

    fn resolve_str(resolver: &Resolver, template: &str, seed: u64) -> String {
        let mut cache = Cache::new();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut value = ResolvedValue::new(None, ValueType::Str, template);
        resolver.resolve(&mut value, &mut cache, &mut rng).unwrap();
        value.value().unwrap().to_string()
    }

    fn resolve_err(resolver: &Resolver, template: &str) -> EngineError {
        let mut cache = Cache::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut value = ResolvedValue::new(
            Some("employee.x".to_string()),
            ValueType::Str,
            template,
        );
        resolver
            .resolve(&mut value, &mut cache, &mut rng)
            .unwrap_err()
    }

    #[test]
    fn plain_template_is_its_own_value() {
        let resolver = test_resolver();
        assert_eq!(resolve_str(&resolver, "just text", 1), "just text");
    }

    #[test]
    fn str_generates_requested_length_and_case() {
        let resolver = test_resolver();

        let value = resolve_str(&resolver, "func.str(6)", 2);
        assert_eq!(value.len(), 6);
        assert!(value.chars().all(|c| c.is_ascii_lowercase()));

        let value = resolve_str(&resolver, "func.str(4, UPPER)", 3);
        assert_eq!(value.len(), 4);
        assert!(value.chars().all(|c| c.is_ascii_uppercase()));

        let value = resolve_str(&resolver, "func.str(5, cap)", 4);
        assert!(value.chars().next().unwrap().is_ascii_uppercase());
        assert!(value[1..].chars().all(|c| c.is_ascii_lowercase()));

        for seed in 0..20 {
            let value = resolve_str(&resolver, "func.str(3-8)", seed);
            assert!((3..=8).contains(&value.len()), "len = {}", value.len());
        }
    }

    #[test]
    fn num_generates_requested_digits() {
        let resolver = test_resolver();

        let value = resolve_str(&resolver, "func.num(5)", 7);
        assert_eq!(value.len(), 5);
        assert!(value.chars().all(|c| c.is_ascii_digit()));
        assert_ne!(value.chars().next(), Some('0'));

        let value = resolve_str(&resolver, "func.num(3, 2)", 8);
        let (whole, frac) = value.split_once('.').unwrap();
        assert_eq!(whole.len(), 3);
        assert_eq!(frac.len(), 2);
    }

    #[test]
    fn num_truncates_or_rounds_referenced_values() {
        let resolver = test_resolver();
        let mut cache = Cache::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let cases = [
            ("func.num(~rate, 2t)", "4.56"),
            ("func.num(~rate, 2r)", "4.57"),
            ("func.num(~rate, 2)", "4.57"),
            ("func.num(~rate)", "4.567"),
        ];
        for (i, (template, expected)) in cases.iter().enumerate() {
            let mut value = ResolvedValue::new(
                Some(format!("employee.calc{i}")),
                ValueType::Num,
                *template,
            );
            resolver.resolve(&mut value, &mut cache, &mut rng).unwrap();
            assert_eq!(value.value(), Some(*expected), "{template}");
        }
    }

    #[test]
    fn rand_respects_range() {
        let resolver = test_resolver();
        for seed in 0..30 {
            let value: i64 = resolve_str(&resolver, "func.rand(10-20)", seed).parse().unwrap();
            assert!((10..=20).contains(&value), "value = {value}");

            let value: i64 = resolve_str(&resolver, "func.rand(4)", seed).parse().unwrap();
            assert!((0..4).contains(&value), "value = {value}");
        }
    }

    #[test]
    fn pick_chooses_one_of_the_args() {
        let resolver = test_resolver();
        for seed in 0..10 {
            let value = resolve_str(&resolver, "func.pick(red, green, blue)", seed);
            assert!(["red", "green", "blue"].contains(&value.as_str()));
        }
    }

    #[test]
    fn quoted_args_keep_embedded_commas() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "func.pick(\"a, b\")", 1);
        assert_eq!(value, "a, b");
    }

    #[test]
    fn gen_substitutes_pattern_chars() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "func.gen(AB-##-^^-@@)", 5);
        assert_eq!(&value[..3], "AB-");
        assert!(value[3..5].chars().all(|c| c.is_ascii_digit()));
        assert!(value[6..8].chars().all(|c| c.is_ascii_uppercase()));
        assert!(value[9..11].chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn gen_uuid_is_version_4() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "func.gen(UUID)", 6);
        assert_eq!(value.len(), 36);
        assert_eq!(value.as_bytes()[14], b'4');

        // Same seed, same UUID.
        assert_eq!(value, resolve_str(&resolver, "func.gen(UUID)", 6));
    }

    #[test]
    fn date_formats_and_adjusts() {
        let resolver = test_resolver();

        let value = resolve_str(&resolver, "func.date(2024-03-10)", 1);
        assert_eq!(value, "2024-03-10T00:00:00");

        let value = resolve_str(&resolver, "func.date(2024-03-10, +1y)", 1);
        assert_eq!(value, "2025-03-10T00:00:00");

        let value = resolve_str(&resolver, "func.date(2024-03-10, -5d, %d/%m/%Y)", 1);
        assert_eq!(value, "05/03/2024");
    }

    #[test]
    fn date_epoch_reflects_the_computed_date() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "func.date(1970-01-02, , epoch)", 1);
        assert_eq!(value, "86400");
    }

    #[test]
    fn time_adjusts_and_defaults_to_hms() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "func.time(10:30, +30m)", 1);
        assert_eq!(value, "11:00:00");
    }

    #[test]
    fn if_compares_numbers_and_strings() {
        let resolver = test_resolver();
        assert_eq!(resolve_str(&resolver, "func.if(10, >9, big, small)", 1), "big");
        assert_eq!(resolve_str(&resolver, "func.if(10, >90, big, small)", 1), "small");
        assert_eq!(resolve_str(&resolver, "func.if(abc, =abc, yes, no)", 1), "yes");
    }

    #[test]
    fn math_applies_left_to_right() {
        let resolver = test_resolver();
        assert_eq!(resolve_str(&resolver, "func.math(10, +5, *2)", 1), "30");
        assert_eq!(resolve_str(&resolver, "func.math(9, /2)", 1), "4.5");
    }

    #[test]
    fn nested_calls_resolve_inside_args() {
        let resolver = test_resolver();
        let value: f64 = resolve_str(&resolver, "func.math(func.rand(1-9), +10)", 3)
            .parse()
            .unwrap();
        assert!((11.0..=19.0).contains(&value), "value = {value}");
    }

    #[test]
    fn escaped_brackets_are_literals() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "func.pick(a\\(b\\))", 1);
        assert_eq!(value, "a(b)");
    }

    #[test]
    fn function_names_are_case_insensitive() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "FUNC.STR(3)", 1);
        assert_eq!(value.len(), 3);
    }

    #[test]
    fn multiple_calls_splice_into_surrounding_text() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "x-func.gen(#)-func.gen(#)-y", 9);
        let parts: Vec<&str> = value.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "x");
        assert_eq!(parts[3], "y");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn help_returns_usage_text() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "func.num(--help)", 1);
        // The usage text mentions other calls; none of them may run.
        assert!(value.starts_with("Usage: func.num"));
        assert!(value.contains("func.num(arg1, [arg2])"), "{value}");
    }

    #[test]
    fn results_pass_through_without_rescanning() {
        let resolver = test_resolver();
        let value = resolve_str(&resolver, "func.sample(notes)", 1);
        assert_eq!(value, "pay func. later");
    }

    #[test]
    fn unknown_function_lists_known_names() {
        let resolver = test_resolver();
        let err = resolve_err(&resolver, "func.nope(1)");
        let message = err.to_string();
        assert!(message.starts_with("cannot resolve employee.x:"), "{message}");
        assert!(message.contains("unknown function 'func.nope(...)'"), "{message}");
        assert!(message.contains("STR, NUM, DATE"), "{message}");
    }

    #[test]
    fn missing_brackets_are_reported() {
        let resolver = test_resolver();
        let err = resolve_err(&resolver, "func.num 3");
        assert!(err.to_string().contains("missing opening bracket"));

        let err = resolve_err(&resolver, "func.num(3");
        assert!(err.to_string().contains("missing closing bracket"));
    }

    #[test]
    fn ref_shares_the_cached_sibling_value() {
        let resolver = test_resolver();
        let mut cache = Cache::new();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let mut age = ResolvedValue::new(
            Some("employee.age".to_string()),
            ValueType::Num,
            "func.rand(18-65)",
        );
        resolver.resolve(&mut age, &mut cache, &mut rng).unwrap();
        let age_value: f64 = age.value().unwrap().parse().unwrap();

        let mut retire = ResolvedValue::new(
            Some("employee.retire_age".to_string()),
            ValueType::Num,
            "func.math(~age, +5)",
        );
        resolver.resolve(&mut retire, &mut cache, &mut rng).unwrap();
        let retire_value: f64 = retire.value().unwrap().parse().unwrap();

        assert_eq!(retire_value, age_value + 5.0);
    }

    #[test]
    fn ref_resolves_the_sibling_on_demand() {
        let resolver = test_resolver();
        let mut cache = Cache::new();
        let mut rng = ChaCha8Rng::seed_from_u64(12);

        // retire_age pulls in age even though age was never resolved.
        let mut retire = ResolvedValue::new(
            Some("employee.retire_age".to_string()),
            ValueType::Num,
            "func.math(~age, +5)",
        );
        resolver.resolve(&mut retire, &mut cache, &mut rng).unwrap();

        let age = cache.get_value("employee.age").unwrap();
        let age_value: f64 = age.value().unwrap().parse().unwrap();
        let retire_value: f64 = retire.value().unwrap().parse().unwrap();
        assert_eq!(retire_value, age_value + 5.0);
    }

    #[test]
    fn circular_refs_are_an_error() {
        let resolver = test_resolver();
        let mut cache = Cache::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mut value = ResolvedValue::new(
            Some("employee.loop_a".to_string()),
            ValueType::Str,
            "func.ref(loop_b)",
        );
        let err = resolver.resolve(&mut value, &mut cache, &mut rng).unwrap_err();
        assert!(err.to_string().contains("cannot resolve employee.loop_a"));
    }

    #[test]
    fn sample_gender_follows_the_referenced_attribute() {
        let resolver = test_resolver();

        for seed in 0..20 {
            let mut cache = Cache::new();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            let mut first = ResolvedValue::new(
                Some("employee.first".to_string()),
                ValueType::Str,
                "func.sample(firstnames)",
            );
            resolver.resolve(&mut first, &mut cache, &mut rng).unwrap();

            let mut title = ResolvedValue::new(
                Some("employee.title".to_string()),
                ValueType::Str,
                "func.sample(titles, ~first)",
            );
            resolver.resolve(&mut title, &mut cache, &mut rng).unwrap();

            match first.value().unwrap() {
                "Arthur" => assert_eq!(title.value(), Some("Mr")),
                "Beth" => assert_eq!(title.value(), Some("Ms")),
                other => panic!("unexpected sample {other}"),
            }
        }
    }

    #[test]
    fn gendered_template_reports_its_gender() {
        let resolver = test_resolver();
        let mut cache = Cache::new();
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let mut first = ResolvedValue::new(
            Some("employee.first".to_string()),
            ValueType::Str,
            "func.sample(firstnames)",
        );
        resolver.resolve(&mut first, &mut cache, &mut rng).unwrap();

        match first.value().unwrap() {
            "Arthur" => assert_eq!(first.gender(), Gender::Male),
            "Beth" => assert_eq!(first.gender(), Gender::Female),
            other => panic!("unexpected sample {other}"),
        }
    }

    #[test]
    fn cached_attribute_resolves_once() {
        let resolver = test_resolver();
        let mut cache = Cache::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let mut a = ResolvedValue::new(
            Some("employee.id".to_string()),
            ValueType::Num,
            "func.num(3)",
        );
        resolver.resolve(&mut a, &mut cache, &mut rng).unwrap();

        let mut b = ResolvedValue::new(
            Some("employee.id".to_string()),
            ValueType::Num,
            "func.num(3)",
        );
        resolver.resolve(&mut b, &mut cache, &mut rng).unwrap();

        assert_eq!(a.value(), b.value());
    }

    #[test]
    fn nocache_attribute_is_not_memoized() {
        let resolver = test_resolver();
        let mut cache = Cache::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let mut value = ResolvedValue::new(
            Some("employee.token.NOCACHE".to_string()),
            ValueType::Str,
            "func.str(8)",
        );
        resolver.resolve(&mut value, &mut cache, &mut rng).unwrap();
        assert!(!cache.has("employee.token.NOCACHE"));
    }

    #[test]
    fn route_matching_seeds_path_variables() {
        let mut service = ApiService::new();
        let mut employee = Entity::parent("employee");
        employee
            .add_child(Entity::scalar("id", ValueType::Num, "func.num(3)"))
            .unwrap();
        service.root.add_child(employee).unwrap();
        service.apis.push(Api::new(
            Method::Get,
            Route::new("/api/employees/{id}"),
        ));

        let resolver = Resolver::new(service, Box::new(MapSource(HashMap::new())));

        let (api, cache) = resolver.match_route(Method::Get, "/api/employees/42").unwrap();
        assert_eq!(api.method, Method::Get);
        assert_eq!(cache.get_value("path.id").unwrap().value(), Some("42"));

        assert!(resolver.match_route(Method::Delete, "/api/employees/42").is_none());
        assert!(resolver.match_route(Method::Get, "/api/orders/42").is_none());
    }

    #[test]
    fn find_entity_follows_refs() {
        let resolver = test_resolver();
        let entity = resolver.find_entity("employee.first").unwrap();
        assert!(matches!(entity.kind, EntityKind::Scalar { ty: ValueType::Str, .. }));
        assert!(resolver.find_entity("missing").is_err());
    }
}

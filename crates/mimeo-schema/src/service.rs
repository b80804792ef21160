use serde_json::Value;
use tracing::info;

use mimeo_model::{Api, ApiBody, ApiService, Entity, Method, Persistence, Route, ValueType};

use crate::error::{SchemaError, SchemaResult};

/// Loads a complete service definition from a JSON document.
pub fn load_service_str(definition: &str) -> SchemaResult<ApiService> {
    let tree: Value = serde_json::from_str(definition)?;
    load_service(&tree)
}

/// Loads a complete service definition from a parse tree with the
/// optional top-level sections `entity`, `alias` and `api`.
pub fn load_service(tree: &Value) -> SchemaResult<ApiService> {
    let mut service = ApiService::new();

    if tree.is_null() {
        return Ok(service);
    }

    let root = tree.as_object().ok_or_else(|| {
        SchemaError::Entity("service definition must be a mapping at the top level".into())
    })?;

    if let Some(entities) = root.get("entity") {
        let entities = entities
            .as_object()
            .ok_or_else(|| SchemaError::Entity("entity section must be a mapping".into()))?;
        for (name, node) in entities {
            let entity = parse_entity(None, name, node)?;
            service.root.add_child(entity)?;
        }
    }

    if let Some(aliases) = root.get("alias") {
        parse_aliases(&mut service, aliases)?;
    }

    if let Some(apis) = root.get("api") {
        parse_apis(&mut service, apis)?;
    }

    info!(
        entities = service.root.children().len(),
        apis = service.apis.len(),
        "service definition loaded"
    );

    Ok(service)
}

fn parse_entity(parent: Option<&str>, name: &str, node: &Value) -> SchemaResult<Entity> {
    let full_name = match parent {
        Some(parent) => format!("{parent}.{name}"),
        None => name.to_string(),
    };

    if name.contains(' ') {
        return Err(SchemaError::Entity(format!(
            "'{full_name}' must not contain spaces"
        )));
    }
    if name.contains('.') {
        return Err(SchemaError::Entity(format!(
            "attribute '{name}' must not contain a dot"
        )));
    }

    match node {
        Value::Object(children) => {
            let mut entity = Entity::parent(name);
            for (child_name, child_node) in children {
                let child = parse_entity(Some(&full_name), child_name, child_node)?;
                entity.add_child(child)?;
            }
            Ok(entity)
        }
        Value::Array(items) => {
            let mut entity = Entity::array(name);
            for (i, item) in items.iter().enumerate() {
                let child = parse_entity(Some(&full_name), &format!("~{}", i + 1), item)?;
                entity.add_child(child)?;
            }
            Ok(entity)
        }
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            let scalar = match node {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            parse_scalar(&full_name, name, &scalar)
        }
        _ => Err(SchemaError::Entity(format!(
            "{full_name} has unsupported node type"
        ))),
    }
}

/// Parses a `TYPE,VALUE` leaf. An empty value is valid (`STR,`); a
/// missing comma or unknown type is not.
fn parse_scalar(full_name: &str, name: &str, scalar: &str) -> SchemaResult<Entity> {
    let Some((keyword, template)) = scalar.split_once(',') else {
        return Err(SchemaError::Entity(format!(
            "{full_name} must be in format TYPE,VALUE. For a null value use 'TYPE,{}' \
             and for an empty string use 'STR,'",
            mimeo_model::NULL_VALUE
        )));
    };

    let keyword = keyword.trim();
    let template = template.trim();

    if keyword.eq_ignore_ascii_case("REF") {
        return Ok(Entity::reference(name, template));
    }

    match ValueType::parse(keyword) {
        Some(ty) => Ok(Entity::scalar(name, ty, template)),
        None => Err(SchemaError::Entity(format!(
            "{full_name} has unknown type: {keyword}"
        ))),
    }
}

/// An alias is shorthand for a REF entity; `my_alias: emp_id` is
/// equivalent to `my_entity: REF, emp_id`.
fn parse_aliases(service: &mut ApiService, aliases: &Value) -> SchemaResult<()> {
    let aliases = aliases
        .as_object()
        .ok_or_else(|| SchemaError::Alias("alias section must be a mapping".into()))?;

    for (name, node) in aliases {
        let target = match node {
            Value::String(target) => target.trim().to_string(),
            Value::Array(_) => {
                return Err(SchemaError::Alias(format!(
                    "alias '{name}' should have quotes around an array, e.g. NAME: \"[VALUE, 1]\""
                )));
            }
            _ => {
                return Err(SchemaError::Alias(format!(
                    "alias '{name}' should be in format NAME: VALUE"
                )));
            }
        };

        service.root.add_child(Entity::reference(name, target))?;
    }

    Ok(())
}

fn parse_apis(service: &mut ApiService, apis: &Value) -> SchemaResult<()> {
    let apis = apis
        .as_array()
        .ok_or_else(|| SchemaError::Api("api section must be a sequence".into()))?;

    for (i, node) in apis.iter().enumerate() {
        let api_num = i + 1;
        let api = parse_api(api_num, node)?;

        for existing in &service.apis {
            if api.method == existing.method && api.route.same_shape(&existing.route) {
                return Err(SchemaError::Api(format!("api.~{api_num} is a duplicate")));
            }
        }

        service.apis.push(api);
    }

    Ok(())
}

fn parse_api(api_num: usize, node: &Value) -> SchemaResult<Api> {
    let fields = node
        .as_object()
        .ok_or_else(|| SchemaError::Api(format!("api.~{api_num} must be a mapping")))?;

    let field_str = |key: &str| fields.get(key).and_then(Value::as_str);

    let (Some(method_str), Some(path_str)) = (field_str("method"), field_str("path")) else {
        return Err(SchemaError::Api(format!(
            "api.~{api_num} must have method and path attributes"
        )));
    };

    if path_str.contains('?') {
        return Err(SchemaError::Api(format!(
            "api.~{api_num} should not have a pre-defined query string \
             as query params are optional: {path_str}"
        )));
    }

    let method = Method::parse(method_str).ok_or_else(|| {
        SchemaError::Api(format!("api.~{api_num} has unknown method: {method_str}"))
    })?;

    let mut api = Api::new(method, Route::new(path_str));

    if let Some(request) = field_str("request") {
        api.request = Some(ApiBody::parse(request).map_err(|e| {
            SchemaError::Api(format!("api.~{api_num} has bad request '{request}': {e}"))
        })?);
    }

    if let Some(response) = field_str("response") {
        api.response = Some(ApiBody::parse(response).map_err(|e| {
            SchemaError::Api(format!("api.~{api_num} has bad response '{response}': {e}"))
        })?);
    }

    if let Some(persist) = field_str("persist") {
        api.persist = Some(Persistence::new(persist).map_err(|e| {
            SchemaError::Api(format!("api.~{api_num} has bad persist '{persist}': {e}"))
        })?);
    }

    Ok(api)
}

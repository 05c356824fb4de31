use crate::catalog::{OperationCatalog, OperationDescriptor, ParamKind, ParameterSpec, Placement};
use crate::errors::{ErrorCode, McpError};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const OVERVIEW: &str = "Buildot proxies the building Data API and the EMS API. Every operation \
needs the caller's bearer token (via _meta.authorization or the `bearer` argument); help and \
health do not.";

fn parameter_summary(spec: &ParameterSpec) -> Value {
    let mut out = json!({
        "name": spec.name,
        "kind": spec.kind,
        "type": spec.value_type,
        "in": spec.placement,
        "required": spec.required,
    });
    if let Value::Object(map) = &mut out {
        if spec.wire_name() != spec.name {
            map.insert("wire_name".to_string(), json!(spec.wire_name()));
        }
        if let Some(default) = &spec.default {
            map.insert("default".to_string(), default.clone());
        }
        if spec.placement == Placement::Query && spec.kind == ParamKind::List {
            map.insert("list_encoding".to_string(), json!(spec.list_encoding));
        }
        if let Some(description) = &spec.description {
            map.insert("description".to_string(), json!(description));
        }
    }
    out
}

pub fn describe_operation(catalog: &OperationCatalog, op: &OperationDescriptor) -> Value {
    json!({
        "name": op.name,
        "description": op.description,
        "backend": op.backend_id,
        "module": op.module(),
        "method": op.http_method.as_str(),
        "path": op.path,
        "body": op.body.as_str(),
        "response": op.response_kind,
        "extension": op.extension,
        "parameters": op.parameter_specs.iter().map(parameter_summary).collect::<Vec<_>>(),
        "input_schema": catalog.input_schema(&op.name).cloned().unwrap_or(Value::Null),
    })
}

/// `{backend: {module: [operation, ...]}}`, optionally for one backend.
pub fn catalog_summary(catalog: &OperationCatalog, backend: Option<&str>) -> Value {
    let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<&str>>> = BTreeMap::new();
    for op in catalog.iter() {
        if backend.map_or(false, |wanted| wanted != op.backend_id) {
            continue;
        }
        grouped
            .entry(op.backend_id.as_str())
            .or_default()
            .entry(op.module())
            .or_default()
            .push(op.name.as_str());
    }
    json!(grouped)
}

pub fn build_help_payload(catalog: &OperationCatalog, args: &Value) -> Result<Value, McpError> {
    let operation = args
        .get("operation")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let backend = args
        .get("backend")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(name) = operation {
        return Ok(match catalog.get(name) {
            Some(op) => describe_operation(catalog, op),
            None => json!({
                "name": name,
                "known": false,
                "did_you_mean": catalog.suggest(name),
                "hint": "Call help without arguments to list every operation.",
            }),
        });
    }

    if let Some(id) = backend {
        if !catalog.backend_ids().iter().any(|known| known == id) {
            return Err(McpError::new(
                ErrorCode::InvalidParams,
                format!("backend: expected one of {}", catalog.backend_ids().join(", ")),
            ));
        }
    }

    let count = catalog
        .iter()
        .filter(|op| backend.map_or(true, |id| op.backend_id == id))
        .count();
    Ok(json!({
        "overview": OVERVIEW,
        "operations": count,
        "catalog": catalog_summary(catalog, backend),
        "hint": "help({ operation: '<name>' }) shows parameters, wire names and body shape.",
    }))
}

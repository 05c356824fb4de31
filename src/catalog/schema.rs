use super::descriptor::{OperationDescriptor, ParamKind, ParameterSpec};
use crate::constants::limits::SUGGESTION_LIMIT;
use crate::utils::suggest::suggest;
use serde_json::{json, Map, Value};

pub const EXTENSION_FIELD: &str = "extra";

/// Derives the caller-facing input schema of one operation.
pub fn input_schema(descriptor: &OperationDescriptor) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for spec in &descriptor.parameter_specs {
        properties.insert(spec.name.clone(), parameter_schema(spec));
        if spec.required {
            required.push(Value::String(spec.name.clone()));
        }
    }
    if descriptor.extension {
        properties.insert(
            EXTENSION_FIELD.to_string(),
            json!({
                "type": "object",
                "description": "Extra upstream body fields merged last; overrides named parameters."
            }),
        );
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    schema.insert("additionalProperties".to_string(), Value::Bool(false));
    Value::Object(schema)
}

fn parameter_schema(spec: &ParameterSpec) -> Value {
    let element = match spec.value_type.schema_type() {
        Some(kind) => json!({ "type": kind }),
        None => json!({}),
    };
    let mut out = match spec.kind {
        ParamKind::Scalar => element,
        ParamKind::List => json!({ "type": "array", "items": element }),
        ParamKind::Map => json!({ "type": "object" }),
    };
    if let Value::Object(map) = &mut out {
        if let Some(description) = &spec.description {
            map.insert("description".to_string(), json!(description));
        }
        if let Some(default) = &spec.default {
            map.insert("default".to_string(), default.clone());
        }
    }
    out
}

/// Renders jsonschema failures as one human-readable block with
/// did-you-mean hints for unknown fields.
pub fn format_schema_errors(
    operation: &str,
    args: &Value,
    errors: jsonschema::ErrorIterator,
    schema: &Value,
) -> String {
    let known: Vec<String> = schema
        .get("properties")
        .and_then(|v| v.as_object())
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();

    let mut rendered = Vec::new();
    let mut did_you_means = Vec::new();

    for err in errors.take(10) {
        let instance_path = if err.instance_path.to_string().is_empty() {
            "(root)".to_string()
        } else {
            err.instance_path.to_string()
        };
        match &err.kind {
            jsonschema::error::ValidationErrorKind::AdditionalProperties { unexpected } => {
                if unexpected.is_empty() {
                    rendered.push(format!("{}: unknown field", instance_path));
                }
                for unknown in unexpected {
                    rendered.push(format!("{}: unknown field '{}'", instance_path, unknown));
                    let suggestions = suggest(unknown, &known, SUGGESTION_LIMIT);
                    if !suggestions.is_empty() {
                        did_you_means.push(format!(
                            "field '{}': {}",
                            unknown,
                            suggestions.join(", ")
                        ));
                    }
                }
            }
            jsonschema::error::ValidationErrorKind::Required { property } => {
                let prop = property
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| property.to_string());
                rendered.push(format!(
                    "{}: missing required field '{}'",
                    instance_path, prop
                ));
            }
            jsonschema::error::ValidationErrorKind::Type { kind } => {
                let received = node_at(args, &err.instance_path.to_string());
                rendered.push(format!(
                    "{}: expected {}, got {}",
                    instance_path,
                    format_type_kind(kind),
                    json_type_name(&received)
                ));
            }
            _ => {
                rendered.push(format!("{}: {}", instance_path, err));
            }
        }
    }

    let mut lines = Vec::new();
    lines.extend(rendered.iter().map(|line| format!("- {}", line)));
    if !did_you_means.is_empty() {
        lines.push(format!(
            "Did you mean: {}",
            did_you_means
                .iter()
                .take(SUGGESTION_LIMIT)
                .cloned()
                .collect::<Vec<_>>()
                .join(" | ")
        ));
    }
    lines.push(format!("Hint: help({{ operation: '{}' }})", operation));
    lines.join("\n")
}

fn format_type_kind(kind: &jsonschema::error::TypeKind) -> String {
    match kind {
        jsonschema::error::TypeKind::Single(primitive) => primitive.to_string(),
        jsonschema::error::TypeKind::Multiple(types) => {
            let list: Vec<String> = (*types).into_iter().map(|t| t.to_string()).collect();
            if list.is_empty() {
                "unknown".to_string()
            } else {
                list.join(" | ")
            }
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn node_at(root: &Value, instance_path: &str) -> Value {
    let mut current = root;
    for segment in instance_path.trim_start_matches('/').split('/') {
        if segment.is_empty() {
            continue;
        }
        if let Some(obj) = current.as_object() {
            current = obj.get(segment).unwrap_or(&Value::Null);
        } else if let Some(arr) = current.as_array() {
            let idx = segment.parse::<usize>().unwrap_or(0);
            current = arr.get(idx).unwrap_or(&Value::Null);
        }
    }
    current.clone()
}

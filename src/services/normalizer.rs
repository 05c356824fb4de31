use crate::catalog::{BodyShape, ListEncoding, OperationDescriptor, ParamKind, Placement};
use crate::errors::AdapterError;
use serde_json::{Map, Value};

/// Outgoing payload of one call, already keyed by wire names.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    None,
    Json(Map<String, Value>),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl NormalizedRequest {
    pub fn json_body(&self) -> Option<&Map<String, Value>> {
        match &self.body {
            RequestBody::Json(map) => Some(map),
            _ => None,
        }
    }
}

/// Shapes caller arguments into query pairs and a body for `descriptor`.
///
/// Absent and null arguments are dropped, as are empty lists for optional
/// parameters. Declared defaults fill in absent arguments and are always
/// sent. The extension map is merged into the JSON body last and wins over
/// named parameters. Arguments that match no parameter are ignored here;
/// schema validation rejects them earlier.
pub fn normalize(
    descriptor: &OperationDescriptor,
    raw_args: &Map<String, Value>,
    extension: Option<&Map<String, Value>>,
) -> Result<NormalizedRequest, AdapterError> {
    if extension.is_some() && !descriptor.extension {
        return Err(AdapterError::invalid_arguments(
            &descriptor.name,
            "this operation does not accept an `extra` extension map",
        ));
    }

    let mut query = Vec::new();
    let mut body = Map::new();

    for spec in &descriptor.parameter_specs {
        let supplied = raw_args.get(&spec.name).filter(|value| !value.is_null());
        let Some(value) = supplied.or(spec.default.as_ref()) else {
            continue;
        };
        if spec.kind == ParamKind::List && !spec.required && is_empty_list(value) {
            continue;
        }
        let wire = spec.wire_name().to_string();
        match spec.placement {
            Placement::Query => match (spec.kind, value) {
                (ParamKind::List, Value::Array(items)) => match spec.list_encoding {
                    ListEncoding::Repeat => {
                        for item in items {
                            query.push((wire.clone(), render_scalar(item)));
                        }
                    }
                    ListEncoding::Comma => {
                        let joined = items.iter().map(render_scalar).collect::<Vec<_>>().join(",");
                        query.push((wire, joined));
                    }
                },
                _ => query.push((wire, render_scalar(value))),
            },
            Placement::Body => {
                body.insert(wire, value.clone());
            }
        }
    }

    if let Some(extension) = extension {
        for (key, value) in extension {
            body.insert(key.clone(), value.clone());
        }
    }

    let body = match descriptor.body {
        BodyShape::None => RequestBody::None,
        BodyShape::EmptyJson => RequestBody::Json(Map::new()),
        BodyShape::Json => RequestBody::Json(body),
        BodyShape::Form => RequestBody::Form(form_pairs(&body)),
    };

    Ok(NormalizedRequest { query, body })
}

fn is_empty_list(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.is_empty())
}

/// Query/form rendering: strings go out unquoted, containers as compact JSON.
pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn form_pairs(body: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in body {
        match value {
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), render_scalar(item)));
                }
            }
            other => pairs.push((key.clone(), render_scalar(other))),
        }
    }
    pairs
}

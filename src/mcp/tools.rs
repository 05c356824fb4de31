use crate::catalog::OperationCatalog;
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const HEALTH_TOOL: &str = "health";
pub const HELP_TOOL: &str = "help";
pub const BEARER_FIELD: &str = "bearer";

#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Adds the protocol-level `bearer` field to an operation schema. It is
/// stripped again before the arguments reach the dispatcher.
fn with_protocol_fields(schema: &Value) -> Value {
    let mut out = schema.clone();
    if let Some(props) = out.get_mut("properties").and_then(Value::as_object_mut) {
        props.insert(
            BEARER_FIELD.to_string(),
            json!({
                "type": "string",
                "description": "Caller bearer token when _meta.authorization is not available."
            }),
        );
    }
    out
}

fn builtin_tools() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: HELP_TOOL.to_string(),
            description: "Describe the operation catalog, or one operation in detail.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "operation": { "type": "string", "description": "Operation name to describe." },
                    "backend": { "type": "string", "enum": ["data", "ems"] }
                },
                "additionalProperties": false
            }),
        },
        ToolDef {
            name: HEALTH_TOOL.to_string(),
            description: "Adapter liveness and configured backend addresses. No credential needed."
                .to_string(),
            input_schema: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        },
    ]
}

pub fn list_tools(catalog: &OperationCatalog) -> Vec<ToolDef> {
    let mut tools = builtin_tools();
    for op in catalog.iter() {
        let schema = catalog
            .input_schema(&op.name)
            .map(with_protocol_fields)
            .unwrap_or_else(|| json!({ "type": "object" }));
        tools.push(ToolDef {
            name: op.name.clone(),
            description: op.description.clone(),
            input_schema: schema,
        });
    }
    tools
}

/// Wraps a dispatcher result as MCP tool content.
pub fn tool_result(value: &Value) -> Value {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    let mut content = vec![json!({ "type": "text", "text": text })];
    if let Some((mime, data)) = image_payload(value) {
        content.push(json!({ "type": "image", "data": data, "mimeType": mime }));
    }

    let mut out = Map::new();
    out.insert("content".to_string(), Value::Array(content));
    if value.is_object() {
        out.insert("structuredContent".to_string(), value.clone());
    }
    Value::Object(out)
}

fn image_payload(value: &Value) -> Option<(&str, &str)> {
    if !crate::services::transform::is_binary_payload(value) {
        return None;
    }
    let mime = value.get("content_type")?.as_str()?;
    let data = value.get("base64")?.as_str()?;
    mime.starts_with("image/").then_some((mime, data))
}

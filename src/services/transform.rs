use crate::catalog::ResponseKind;
use crate::constants::content;
use crate::errors::AdapterError;
use crate::services::client_factory::UpstreamResponse;
use base64::Engine;
use serde_json::{json, Value};

/// Converts a 2xx upstream response into the caller-facing value.
pub fn transform(response: &UpstreamResponse, kind: ResponseKind) -> Result<Value, AdapterError> {
    match kind {
        ResponseKind::Json => serde_json::from_slice(&response.body).map_err(|err| {
            AdapterError::Decode {
                message: err.to_string(),
            }
        }),
        ResponseKind::Binary => {
            let content_type = response.content_type().unwrap_or(content::OCTET_STREAM);
            Ok(json!({
                "content_type": content_type,
                "base64": base64::engine::general_purpose::STANDARD.encode(&response.body),
            }))
        }
    }
}

/// True for `{content_type, base64}` values produced by the binary transform.
pub fn is_binary_payload(value: &Value) -> bool {
    value.as_object().map_or(false, |map| {
        map.len() == 2 && map.get("content_type").map_or(false, Value::is_string)
            && map.get("base64").map_or(false, Value::is_string)
    })
}

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure taxonomy for one `invoke`. Every variant is terminal: nothing in
/// the adapter retries or recovers locally.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Unknown operation: {name}")]
    UnknownOperation {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("Invalid arguments for {operation}: {message}")]
    InvalidArguments { operation: String, message: String },

    #[error("Upstream returned HTTP {status}")]
    Upstream { status: u16, body: String },

    #[error("Transport failure: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("Upstream body is not valid JSON: {message}")]
    Decode { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    MissingCredential,
    UnknownOperation,
    InvalidArguments,
    Upstream,
    Transport,
    Decode,
    Configuration,
}

impl AdapterErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterErrorKind::MissingCredential => "missing_credential",
            AdapterErrorKind::UnknownOperation => "unknown_operation",
            AdapterErrorKind::InvalidArguments => "invalid_arguments",
            AdapterErrorKind::Upstream => "upstream",
            AdapterErrorKind::Transport => "transport",
            AdapterErrorKind::Decode => "decode",
            AdapterErrorKind::Configuration => "configuration",
        }
    }
}

impl AdapterError {
    pub fn invalid_arguments(operation: impl Into<String>, message: impl Into<String>) -> Self {
        AdapterError::InvalidArguments {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        AdapterError::Configuration {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        AdapterError::Transport {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn kind(&self) -> AdapterErrorKind {
        match self {
            AdapterError::MissingCredential => AdapterErrorKind::MissingCredential,
            AdapterError::UnknownOperation { .. } => AdapterErrorKind::UnknownOperation,
            AdapterError::InvalidArguments { .. } => AdapterErrorKind::InvalidArguments,
            AdapterError::Upstream { .. } => AdapterErrorKind::Upstream,
            AdapterError::Transport { .. } => AdapterErrorKind::Transport,
            AdapterError::Decode { .. } => AdapterErrorKind::Decode,
            AdapterError::Configuration { .. } => AdapterErrorKind::Configuration,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.kind() {
            AdapterErrorKind::MissingCredential => "MISSING_CREDENTIAL",
            AdapterErrorKind::UnknownOperation => "UNKNOWN_OPERATION",
            AdapterErrorKind::InvalidArguments => "INVALID_ARGUMENTS",
            AdapterErrorKind::Upstream => "UPSTREAM_ERROR",
            AdapterErrorKind::Transport => "TRANSPORT_ERROR",
            AdapterErrorKind::Decode => "DECODE_ERROR",
            AdapterErrorKind::Configuration => "CONFIGURATION_ERROR",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AdapterError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AdapterError::Transport {
                timed_out: true,
                ..
            }
        )
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            AdapterError::MissingCredential => Some(
                "Pass the caller's bearer token via _meta.authorization or the `bearer` argument."
                    .to_string(),
            ),
            AdapterError::UnknownOperation { suggestions, .. } if !suggestions.is_empty() => {
                Some(format!("Did you mean: {}?", suggestions.join(", ")))
            }
            AdapterError::UnknownOperation { .. } => {
                Some("Call `help` to list the available operations.".to_string())
            }
            AdapterError::Upstream { body, .. } if !body.is_empty() => {
                Some(format!("upstream body: {}", body))
            }
            _ => None,
        }
    }

    /// Structured form used in logs and CLI output.
    pub fn to_value(&self) -> Value {
        let mut out = serde_json::json!({
            "kind": self.kind(),
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Value::Object(map) = &mut out {
            match self {
                AdapterError::Upstream { status, body } => {
                    map.insert("status".to_string(), Value::from(*status));
                    map.insert("body".to_string(), Value::String(body.clone()));
                }
                AdapterError::UnknownOperation { suggestions, .. } => {
                    map.insert("did_you_mean".to_string(), serde_json::json!(suggestions));
                }
                AdapterError::Transport { timed_out, .. } => {
                    map.insert("timed_out".to_string(), Value::Bool(*timed_out));
                }
                _ => {}
            }
        }
        out
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Transport {
            message: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }
}

use crate::errors::{AdapterError, AdapterErrorKind};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    RequestTimeout = -32001,
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Renders an adapter failure as a JSON-RPC error for the named operation.
    pub fn from_adapter(operation: &str, error: &AdapterError) -> Self {
        let mut lines = vec![
            "BuildotError".to_string(),
            format!("operation: {}", operation),
            format!("kind: {}", error.kind().as_str()),
            format!("code: {}", error.code()),
        ];
        if let Some(status) = error.status() {
            lines.push(format!("status: {}", status));
        }
        lines.push(format!("message: {}", error));
        if let Some(hint) = error.hint() {
            lines.push(format!("hint: {}", hint));
        }
        let message = lines.join("\n");

        let code = match error.kind() {
            AdapterErrorKind::MissingCredential | AdapterErrorKind::InvalidArguments => {
                ErrorCode::InvalidParams
            }
            AdapterErrorKind::UnknownOperation => ErrorCode::MethodNotFound,
            AdapterErrorKind::Transport if error.is_timeout() => ErrorCode::RequestTimeout,
            _ => ErrorCode::InternalError,
        };
        McpError::new(code, message)
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for McpError {}

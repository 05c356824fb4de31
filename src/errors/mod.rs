mod adapter_error;
mod mcp_error;

pub use adapter_error::{AdapterError, AdapterErrorKind};
pub use mcp_error::{ErrorCode, McpError};

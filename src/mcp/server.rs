use crate::app::App;
use crate::catalog::schema::EXTENSION_FIELD;
use crate::errors::{AdapterError, ErrorCode, McpError};
use crate::mcp::help;
use crate::mcp::protocol::{CancelParams, JsonRpcRequest, JsonRpcResponse, ToolCallParams};
use crate::mcp::tools::{list_tools, tool_result, BEARER_FIELD, HEALTH_TOOL, HELP_TOOL};
use crate::services::credential::strip_bearer_prefix;
use crate::services::logger::Logger;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "buildot";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn encode(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_default()
}

/// Parses one stdin line. Malformed JSON and non-request shapes come back as
/// ready-to-send error responses.
fn parse_request(line: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let parsed: Value = serde_json::from_str(line).map_err(|_| {
        JsonRpcResponse::failure(
            Value::Null,
            ErrorCode::ParseError.as_i32(),
            "Parse error".to_string(),
        )
    })?;
    serde_json::from_value(parsed).map_err(|_| {
        JsonRpcResponse::failure(
            Value::Null,
            ErrorCode::InvalidRequest.as_i32(),
            "Invalid request".to_string(),
        )
    })
}

pub struct McpServer {
    app: Arc<App>,
    logger: Logger,
    in_flight: Mutex<HashMap<String, AbortHandle>>,
}

impl McpServer {
    pub fn new(app: Arc<App>) -> Self {
        let logger = app.logger.child("mcp");
        Self {
            app,
            logger,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        json!({ "tools": list_tools(&self.app.catalog) })
    }

    pub async fn handle_tools_call(&self, params: ToolCallParams) -> Result<Value, McpError> {
        let name = params.name.trim().to_string();
        if name.is_empty() {
            return Err(McpError::new(ErrorCode::InvalidParams, "Missing tool name"));
        }
        let mut args = match params.arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            _ => {
                return Err(McpError::new(
                    ErrorCode::InvalidParams,
                    "arguments: expected object",
                ))
            }
        };

        if name == HEALTH_TOOL {
            return Ok(tool_result(&self.app.health()));
        }
        if name == HELP_TOOL {
            let payload = help::build_help_payload(&self.app.catalog, &Value::Object(args))?;
            return Ok(tool_result(&payload));
        }

        let bearer = match args.remove(BEARER_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(token)) => Some(token),
            Some(_) => {
                let err = AdapterError::invalid_arguments(&name, "`bearer` must be a string");
                return Err(McpError::from_adapter(&name, &err));
            }
        };
        let extension = match args.remove(EXTENSION_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                let err = AdapterError::invalid_arguments(&name, "`extra` must be an object");
                return Err(McpError::from_adapter(&name, &err));
            }
        };
        // A source that is blank once the prefix is stripped counts as absent.
        let present = |raw: String| {
            let token = strip_bearer_prefix(&raw).to_string();
            (!token.is_empty()).then_some(token)
        };
        let credential = params
            .meta
            .and_then(|meta| meta.authorization)
            .and_then(present)
            .or_else(|| bearer.and_then(present));

        let value = self
            .app
            .dispatcher
            .invoke(
                &name,
                &args,
                extension.as_ref(),
                credential.as_deref(),
            )
            .await
            .map_err(|err| McpError::from_adapter(&name, &err))?;
        Ok(tool_result(&value))
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            "notifications/cancelled" => {
                self.cancel(&request.params);
                None
            }
            _ if request.method.starts_with("notifications/") => None,
            "initialize" => request
                .id
                .map(|id| JsonRpcResponse::success(id, self.handle_initialize())),
            "ping" => request.id.map(|id| JsonRpcResponse::success(id, json!({}))),
            "tools/list" => request
                .id
                .map(|id| JsonRpcResponse::success(id, self.handle_tools_list())),
            "tools/call" => {
                let id = request.id?;
                let params: ToolCallParams = match serde_json::from_value(request.params) {
                    Ok(params) => params,
                    Err(err) => {
                        return Some(JsonRpcResponse::failure(
                            id,
                            ErrorCode::InvalidParams.as_i32(),
                            format!("Invalid tools/call params: {}", err),
                        ))
                    }
                };
                Some(match self.handle_tools_call(params).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(err) => JsonRpcResponse::failure(id, err.code.as_i32(), err.message),
                })
            }
            _ => request.id.map(|id| {
                JsonRpcResponse::failure(
                    id,
                    ErrorCode::MethodNotFound.as_i32(),
                    "Method not found".to_string(),
                )
            }),
        }
    }

    /// Parses and answers one line without spawning; the stdio loop uses
    /// `serve` instead.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match parse_request(line.trim()) {
            Ok(request) => self.handle_request(request).await,
            Err(response) => Some(response),
        }
    }

    /// Aborts an in-flight `tools/call`. Dropping its future releases the
    /// scoped client it holds.
    fn cancel(&self, params: &Value) {
        let Ok(cancel) = serde_json::from_value::<CancelParams>(params.clone()) else {
            return;
        };
        let key = cancel.request_id.to_string();
        let handle = self
            .in_flight
            .lock()
            .ok()
            .and_then(|mut guard| guard.remove(&key));
        if let Some(handle) = handle {
            handle.abort();
            self.logger.info(
                "request cancelled",
                Some(&json!({ "request_id": cancel.request_id, "reason": cancel.reason })),
            );
        }
    }

    fn forget(&self, key: &str) {
        if let Ok(mut guard) = self.in_flight.lock() {
            guard.remove(key);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Newline-delimited JSON-RPC loop. `tools/call` requests run
    /// concurrently; responses are written as they complete. Returns after
    /// EOF once every in-flight call has answered.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            while let Some(payload) = rx.recv().await {
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let request = match parse_request(trimmed) {
                Ok(request) => request,
                Err(response) => {
                    let _ = tx.send(encode(&response));
                    continue;
                }
            };

            match (request.method.as_str(), request.id.clone()) {
                ("tools/call", Some(id)) => {
                    let key = id.to_string();
                    let server = self.clone();
                    let tx = tx.clone();
                    let task_key = key.clone();
                    let mut guard = self
                        .in_flight
                        .lock()
                        .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "in-flight table poisoned"))?;
                    let handle = tokio::spawn(async move {
                        let response = server.handle_request(request).await;
                        server.forget(&task_key);
                        if let Some(response) = response {
                            let _ = tx.send(encode(&response));
                        }
                    });
                    guard.insert(key, handle.abort_handle());
                }
                _ => {
                    if let Some(response) = self.handle_request(request).await {
                        let _ = tx.send(encode(&response));
                    }
                }
            }
        }

        drop(tx);
        writer_task
            .await
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?
    }
}

pub async fn run_stdio(app: App) -> std::io::Result<()> {
    let server = Arc::new(McpServer::new(Arc::new(app)));
    server.serve(tokio::io::stdin(), tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn server() -> McpServer {
        let app = App::initialize(Settings::default()).expect("app");
        McpServer::new(Arc::new(app))
    }

    #[tokio::test]
    async fn malformed_lines_are_parse_errors() {
        let response = server().handle_line("{not json").await.expect("response");
        assert_eq!(response.error.expect("error").code, -32700);
    }

    #[tokio::test]
    async fn unknown_methods_are_method_not_found() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)
            .await
            .expect("response");
        assert_eq!(response.error.expect("error").code, -32601);
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{}}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn initialized_notification_is_never_answered() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":9,"method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn non_string_bearer_is_invalid_arguments() {
        let response = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"get_sites","arguments":{"bearer":42}}}"#,
            )
            .await
            .expect("response");
        let error = response.error.expect("error");
        assert_eq!(error.code, ErrorCode::InvalidParams.as_i32());
        assert!(error.message.contains("code: INVALID_ARGUMENTS"));
        assert!(error.message.contains("`bearer` must be a string"));
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .expect("response");
        let result = response.result.expect("result");
        assert_eq!(result["serverInfo"]["name"], "buildot");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn missing_credential_surfaces_as_invalid_params() {
        let response = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"get_sites","arguments":{}}}"#,
            )
            .await
            .expect("response");
        let error = response.error.expect("error");
        assert_eq!(error.code, ErrorCode::InvalidParams.as_i32());
        assert!(error.message.contains("code: MISSING_CREDENTIAL"));
    }

    #[tokio::test]
    async fn non_object_extra_is_rejected() {
        let response = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"get_energy_dashboard_data","arguments":{"extra":[1]}}}"#,
            )
            .await
            .expect("response");
        assert!(response
            .error
            .expect("error")
            .message
            .contains("`extra` must be an object"));
    }
}

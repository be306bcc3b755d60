//! A minimal streamable-HTTP MCP server.
//!
//! Serves `initialize`, `ping`, `tools/list` and `tools/call` on a single
//! POST endpoint and answers with JSON bodies. [`time_server`] builds the
//! demo toolset exposing `get_current_time`.
//!
//! # Routes
//!
//! - `POST   /mcp` — JSON-RPC messages
//! - `DELETE /mcp` — end the session named by `Mcp-Session-Id`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use super::transport::{DEFAULT_ENDPOINT, SESSION_ID_HEADER};
use super::types::{CallToolResult, Implementation, McpToolDefinition, PROTOCOL_VERSION};
use crate::jsonrpc::{RpcError, RpcRequest, RpcResponse};

/// Async tool implementation: arguments in, tool result out.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<CallToolResult, RpcError>> + Send + Sync>;

/// Sessions unused for this long are forgotten.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct RegisteredTool {
    definition: McpToolDefinition,
    handler: ToolHandler,
}

/// An MCP server exposing a fixed set of tools.
pub struct McpServer {
    info: Implementation,
    tools: Vec<RegisteredTool>,
    page_size: Option<usize>,
    /// Session id to the time it was last used.
    sessions: DashMap<String, Instant>,
    session_idle_timeout: Duration,
}

impl McpServer {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            info: Implementation {
                name: name.to_string(),
                version: version.to_string(),
            },
            tools: Vec::new(),
            page_size: None,
            sessions: DashMap::new(),
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
        }
    }

    /// Builder: register a tool.
    pub fn with_tool<F, Fut>(mut self, definition: McpToolDefinition, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<CallToolResult, RpcError>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.tools.push(RegisteredTool {
            definition,
            handler,
        });
        self
    }

    /// Builder: split `tools/list` into pages of `size`.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Builder: forget sessions idle for longer than `timeout`.
    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    pub fn info(&self) -> &Implementation {
        &self.info
    }

    /// Router serving this server at `/mcp`.
    pub fn router(self) -> Router {
        Router::new()
            .route(
                DEFAULT_ENDPOINT,
                post(message_handler).delete(end_session_handler),
            )
            .with_state(Arc::new(self))
    }

    fn open_session(&self) -> String {
        let timeout = self.session_idle_timeout;
        self.sessions.retain(|_, last_used| last_used.elapsed() <= timeout);
        let session = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(session.clone(), Instant::now());
        session
    }

    /// Mark `session` as used. False if it is unknown or has gone idle.
    fn touch_session(&self, session: &str) -> bool {
        let timeout = self.session_idle_timeout;
        if self
            .sessions
            .remove_if(session, |_, last_used| last_used.elapsed() > timeout)
            .is_some()
        {
            tracing::info!(session = %session, "MCP session expired");
            return false;
        }
        match self.sessions.get_mut(session) {
            Some(mut last_used) => {
                *last_used = Instant::now();
                true
            }
            None => false,
        }
    }

    fn list_tools(&self, params: &Value) -> Result<Value, RpcError> {
        let start = match params.get("cursor").and_then(Value::as_str) {
            Some(cursor) => cursor
                .parse::<usize>()
                .ok()
                .filter(|n| *n <= self.tools.len())
                .ok_or_else(|| RpcError::new(-32602, format!("invalid cursor '{}'", cursor)))?,
            None => 0,
        };
        let end = match self.page_size {
            Some(size) => (start + size).min(self.tools.len()),
            None => self.tools.len(),
        };
        let tools: Vec<&McpToolDefinition> =
            self.tools[start..end].iter().map(|t| &t.definition).collect();
        let mut result = json!({"tools": tools});
        if end < self.tools.len() {
            result["nextCursor"] = json!(end.to_string());
        }
        Ok(result)
    }

    async fn call_tool(&self, params: &Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::new(-32602, "missing tool name"))?;
        let tool = self
            .tools
            .iter()
            .find(|t| t.definition.name == name)
            .ok_or_else(|| RpcError::new(-32602, format!("unknown tool '{}'", name)))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        tracing::debug!(tool = name, "tools/call");
        let result = (tool.handler)(arguments).await?;
        serde_json::to_value(result).map_err(|e| RpcError::new(-32603, e.to_string()))
    }
}

fn session_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// POST /mcp — one JSON-RPC message.
async fn message_handler(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let request: RpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            let error = RpcError::new(-32600, format!("Invalid Request: {}", e));
            return (StatusCode::BAD_REQUEST, Json(RpcResponse::failure(Value::Null, error)))
                .into_response();
        }
    };

    if request.method == "initialize" {
        return initialize(&server, request);
    }

    match session_of(&headers) {
        Some(session) if server.touch_session(&session) => {}
        Some(_) => return (StatusCode::NOT_FOUND, "unknown session").into_response(),
        None => return (StatusCode::BAD_REQUEST, "missing session id").into_response(),
    }

    let Some(id) = request.id.clone() else {
        tracing::debug!(method = %request.method, "notification");
        return StatusCode::ACCEPTED.into_response();
    };

    let params = request.params.unwrap_or_else(|| json!({}));
    let outcome = match request.method.as_str() {
        "ping" => Ok(json!({})),
        "tools/list" => server.list_tools(&params),
        "tools/call" => server.call_tool(&params).await,
        other => Err(RpcError::new(-32601, format!("Method not found: {}", other))),
    };
    let response = match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    };
    Json(response).into_response()
}

fn initialize(server: &McpServer, request: RpcRequest) -> Response {
    let id = request.id.unwrap_or(Value::Null);
    let session = server.open_session();
    tracing::info!(session = %session, "MCP session started");

    let result = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {"tools": {"listChanged": false}},
        "serverInfo": server.info,
    });
    (
        [(SESSION_ID_HEADER, session)],
        Json(RpcResponse::success(id, result)),
    )
        .into_response()
}

/// DELETE /mcp — end a session.
async fn end_session_handler(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
) -> StatusCode {
    match session_of(&headers).and_then(|s| server.sessions.remove(&s)) {
        Some((session, _)) => {
            tracing::info!(session = %session, "MCP session ended");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

// ---------------------------------------------------------------------------
// Demo time toolset
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GetCurrentTimeArgs {
    city: String,
}

/// Mock current time for `city`, looked up case-insensitively.
pub fn get_current_time(city: &str) -> CallToolResult {
    let times: HashMap<&str, &str> = HashMap::from([("london", "10.30am"), ("new york", "5.30am")]);
    match times.get(city.to_lowercase().as_str()) {
        Some(time) => CallToolResult::text(format!("The current time is {}", time)),
        None => CallToolResult::text(format!(
            "Unfortunately the time for {} is currently unavailable",
            city
        )),
    }
}

fn get_current_time_definition() -> McpToolDefinition {
    McpToolDefinition {
        name: "get_current_time".to_string(),
        title: None,
        description: Some("Retrieves the current time".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City for which to retrieve the current time."
                }
            },
            "required": ["city"]
        }),
        output_schema: None,
        annotations: None,
    }
}

/// The demo server exposing `get_current_time`.
pub fn time_server() -> McpServer {
    McpServer::new("My Remote MCP Server", "1.0.0").with_tool(
        get_current_time_definition(),
        |args: Value| async move {
            let args: GetCurrentTimeArgs = serde_json::from_value(args).map_err(|e| {
                RpcError::new(-32602, format!("invalid arguments for get_current_time: {}", e))
            })?;
            Ok(get_current_time(&args.city))
        },
    )
}

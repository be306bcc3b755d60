//! Transports carrying MCP JSON-RPC messages.
//!
//! [`McpTransport`] is the seam the client talks through; tests substitute
//! an in-memory implementation. [`StreamableHttpTransport`] speaks the
//! streamable HTTP transport: every message is a POST to one endpoint, and
//! the server answers with either a JSON body or an event stream.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode, Url};

use super::types::PROTOCOL_VERSION;
use crate::context::InvocationContext;
use crate::error::{AuthError, BridgeError, Result};
use crate::jsonrpc::{RpcRequest, RpcResponse};
use crate::transport::sse::event_stream;
use crate::transport::{AuthorizedClient, CallRequest};

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Default path of the MCP endpoint on a toolset host.
pub const DEFAULT_ENDPOINT: &str = "/mcp";

/// Message transport between an MCP client and one server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for the response that answers it.
    async fn request(&self, ctx: &InvocationContext, request: RpcRequest) -> Result<RpcResponse>;

    /// Send a notification. No response is expected.
    async fn notify(&self, ctx: &InvocationContext, notification: RpcRequest) -> Result<()>;

    /// Record the protocol version agreed during `initialize`.
    fn set_protocol_version(&self, _version: &str) {}

    /// End the session, if the transport holds one.
    async fn close(&self, _ctx: &InvocationContext) -> Result<()> {
        Ok(())
    }

    /// Identifier used in logs and error messages.
    fn server_identifier(&self) -> String;
}

// ---------------------------------------------------------------------------
// StreamableHttpTransport
// ---------------------------------------------------------------------------

/// Streamable HTTP transport over an [`AuthorizedClient`].
///
/// The session id handed out by the server on `initialize` is echoed on
/// every later message.
#[derive(Debug)]
pub struct StreamableHttpTransport {
    client: AuthorizedClient,
    endpoint: Url,
    session_id: RwLock<Option<String>>,
    protocol_version: RwLock<Option<String>>,
}

impl StreamableHttpTransport {
    /// Transport for `endpoint` (e.g. `/mcp`) on `host`.
    pub fn new(client: AuthorizedClient, host: &Url, endpoint: &str) -> Result<Self> {
        let endpoint = client.join(host, endpoint)?;
        Ok(Self {
            client,
            endpoint,
            session_id: RwLock::new(None),
            protocol_version: RwLock::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    async fn post(&self, ctx: &InvocationContext, message: &RpcRequest) -> Result<reqwest::Response> {
        let mut request = CallRequest::new(Method::POST, self.endpoint.clone())
            .with_header("accept", "application/json, text/event-stream")
            .with_json(message.to_value());
        let sent = self.session_id.read().clone();
        if let Some(session) = sent.as_deref() {
            request = request.with_header(SESSION_ID_HEADER, session);
        }
        let version = self
            .protocol_version
            .read()
            .clone()
            .unwrap_or_else(|| PROTOCOL_VERSION.to_string());
        request = request.with_header(PROTOCOL_VERSION_HEADER, &version);

        let response = self.client.send(ctx, request).await?;
        if let Some(session) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut current = self.session_id.write();
            if current.as_deref() != Some(session) {
                log::debug!("MCP session {} established with {}", session, self.endpoint);
                *current = Some(session.to_string());
            }
        }
        self.check_status(ctx, response, sent.as_deref()).await
    }

    /// Map a non-success status to an error. `sent` is the session id the
    /// request carried.
    async fn check_status(
        &self,
        ctx: &InvocationContext,
        response: reqwest::Response,
        sent: Option<&str>,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected {
                audience: self.client.audience().to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        if let (StatusCode::NOT_FOUND, Some(sent)) = (status, sent) {
            log::warn!("MCP session {} with {} has expired", sent, self.endpoint);
            let mut current = self.session_id.write();
            // A concurrent caller may already hold a fresh session.
            if current.as_deref() == Some(sent) {
                *current = None;
            }
            return Err(BridgeError::SessionExpired {
                peer: self.server_identifier(),
            });
        }
        let body = self.client.read_text(ctx, response).await.unwrap_or_default();
        Err(BridgeError::PeerRejected {
            peer: self.server_identifier(),
            status: status.as_u16(),
            body,
        })
    }

    /// Read events until the response answering `request` arrives.
    async fn read_event_stream(
        &self,
        ctx: &InvocationContext,
        response: reqwest::Response,
        request: &RpcRequest,
    ) -> Result<RpcResponse> {
        let peer = self.server_identifier();
        let id = request.id.clone().unwrap_or_default();
        let mut events = event_stream(response.bytes_stream(), peer.clone(), ctx.clone());

        while let Some(event) = events.next().await {
            let event = event?;
            if event.data.trim().is_empty() {
                continue;
            }
            // Server-initiated requests and notifications share the stream.
            match serde_json::from_str::<RpcResponse>(&event.data) {
                Ok(message) if message.answers(&id) => return Ok(message),
                Ok(_) => log::debug!("Ignoring unrelated message from {}", peer),
                Err(e) => log::debug!("Ignoring undecodable event from {}: {}", peer, e),
            }
        }
        Err(BridgeError::decode(
            peer,
            format!("event stream ended before a response to '{}'", request.method),
        ))
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn request(&self, ctx: &InvocationContext, request: RpcRequest) -> Result<RpcResponse> {
        let response = self.post(ctx, &request).await?;
        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |v| v.starts_with("text/event-stream"));

        if is_stream {
            return self.read_event_stream(ctx, response, &request).await;
        }
        let body = self.client.read_text(ctx, response).await?;
        serde_json::from_str(&body).map_err(|e| BridgeError::decode(self.server_identifier(), e))
    }

    async fn notify(&self, ctx: &InvocationContext, notification: RpcRequest) -> Result<()> {
        self.post(ctx, &notification).await?;
        Ok(())
    }

    fn set_protocol_version(&self, version: &str) {
        *self.protocol_version.write() = Some(version.to_string());
    }

    /// DELETE the session. A server that already forgot it (404) or does
    /// not support explicit termination (405) is not an error.
    async fn close(&self, ctx: &InvocationContext) -> Result<()> {
        let Some(session) = self.session_id.write().take() else {
            return Ok(());
        };
        let request = CallRequest::new(Method::DELETE, self.endpoint.clone())
            .with_header(SESSION_ID_HEADER, &session);
        let response = self.client.send(ctx, request).await?;
        let status = response.status();
        if status.is_success()
            || status == StatusCode::NOT_FOUND
            || status == StatusCode::METHOD_NOT_ALLOWED
        {
            log::debug!("MCP session {} with {} closed", session, self.endpoint);
            return Ok(());
        }
        self.check_status(ctx, response, None).await.map(|_| ())
    }

    fn server_identifier(&self) -> String {
        format!("http:{}", self.endpoint)
    }
}

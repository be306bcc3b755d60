//! HTTP plumbing shared by peer proxies and toolset transports.
//!
//! Every outbound call is described by a [`CallRequest`], passed through an
//! ordered chain of [`CallInterceptor`]s (`before` in order, `after` in
//! reverse order, each exactly once per round trip), and sent by an
//! [`AuthorizedClient`] whose HTTP client is built once and reused.

pub mod client;
pub mod sse;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;

use crate::error::Result;

pub use client::AuthorizedClient;
pub use sse::{SseDecoder, SseEvent};

// ---------------------------------------------------------------------------
// Call metadata
// ---------------------------------------------------------------------------

/// An outbound call before it is sent. Interceptors may edit headers.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl CallRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Builder: set a JSON body.
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Builder: set a header. Invalid values are ignored with a warning.
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        match value.parse::<HeaderValue>() {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(_) => log::warn!("Dropping invalid value for header '{}'", name),
        }
        self
    }
}

/// Response-level metadata handed to `after`. The body stays with the caller.
#[derive(Debug, Clone)]
pub struct CallResponse {
    pub method: Method,
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// CallInterceptor
// ---------------------------------------------------------------------------

/// Hook around every outbound call.
///
/// `before` may mutate the request and abort it by returning an error, in
/// which case nothing is sent. `after` observes the response status and
/// headers; the default does nothing.
#[async_trait]
pub trait CallInterceptor: Send + Sync {
    async fn before(&self, request: &mut CallRequest) -> Result<()>;

    async fn after(&self, _response: &CallResponse) -> Result<()> {
        Ok(())
    }
}

/// Logs each call at debug level and failures at warn level.
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl CallInterceptor for LoggingInterceptor {
    async fn before(&self, request: &mut CallRequest) -> Result<()> {
        log::debug!("-> {} {}", request.method, request.url);
        Ok(())
    }

    async fn after(&self, response: &CallResponse) -> Result<()> {
        let elapsed_ms = response.elapsed.as_millis();
        if response.status.is_success() {
            log::debug!(
                "<- {} {} {} ({}ms)",
                response.status.as_u16(),
                response.method,
                response.url,
                elapsed_ms
            );
        } else {
            log::warn!(
                "<- {} {} {} ({}ms)",
                response.status.as_u16(),
                response.method,
                response.url,
                elapsed_ms
            );
        }
        Ok(())
    }
}

//! The interceptor-equipped HTTP client behind every peer and toolset.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Url;

use super::{CallInterceptor, CallRequest, CallResponse};
use crate::auth::{Audience, AuthInterceptor, CredentialStore};
use crate::context::InvocationContext;
use crate::error::{BridgeError, Result};

/// Default per-request timeout applied by the underlying HTTP client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An HTTP client bound to one audience.
///
/// The first interceptor is always the [`AuthInterceptor`] for the client's
/// own audience, so a client can only ever present that audience's token.
/// Cloning shares the underlying connection pool and interceptor chain.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    audience: Audience,
    interceptors: Vec<Arc<dyn CallInterceptor>>,
}

impl fmt::Debug for AuthorizedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedClient")
            .field("audience", &self.audience)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl AuthorizedClient {
    /// Build a client for `audience`, with the default request timeout.
    pub fn new(store: &CredentialStore, audience: Audience) -> Result<Self> {
        Self::with_timeout(store, audience, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        store: &CredentialStore,
        audience: Audience,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {}", e)))?;
        let auth = AuthInterceptor::new(store.context(&audience));
        Ok(Self {
            http,
            audience,
            interceptors: vec![Arc::new(auth)],
        })
    }

    /// Builder: append an interceptor after the auth interceptor.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn CallInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn audience(&self) -> &Audience {
        &self.audience
    }

    /// Send `request` through the interceptor chain.
    ///
    /// Returns the raw response for any status; status handling is left to
    /// the caller. Only the response head is awaited here, read the body
    /// under the same context.
    pub async fn send(
        &self,
        ctx: &InvocationContext,
        request: CallRequest,
    ) -> Result<reqwest::Response> {
        ctx.run(self.send_inner(request)).await
    }

    async fn send_inner(&self, mut request: CallRequest) -> Result<reqwest::Response> {
        for interceptor in &self.interceptors {
            interceptor.before(&mut request).await?;
        }

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| BridgeError::fetch(self.audience.as_str(), e))?;

        let meta = CallResponse {
            method: request.method,
            url: request.url,
            status: response.status(),
            headers: response.headers().clone(),
            elapsed: started.elapsed(),
        };
        for interceptor in self.interceptors.iter().rev() {
            interceptor.after(&meta).await?;
        }
        Ok(response)
    }

    /// Read a response body as text under `ctx`.
    pub async fn read_text(
        &self,
        ctx: &InvocationContext,
        response: reqwest::Response,
    ) -> Result<String> {
        let peer = self.audience.as_str().to_string();
        ctx.run(async move { response.text().await.map_err(|e| BridgeError::fetch(peer, e)) })
            .await
    }

    /// Resolve `path` against `base`, refusing URLs outside this audience.
    pub fn join(&self, base: &Url, path: &str) -> Result<Url> {
        let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));
        let url = Url::parse(&joined)
            .map_err(|e| BridgeError::Config(format!("invalid URL '{}': {}", joined, e)))?;
        if !self.audience.matches(&url) {
            return Err(BridgeError::Config(format!(
                "'{}' is outside audience '{}'",
                url, self.audience
            )));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{spawn_router, FakeIssuer};
    use async_trait::async_trait;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use axum::Router;
    use reqwest::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingInterceptor {
        before: AtomicUsize,
        after: AtomicUsize,
    }

    #[async_trait]
    impl CallInterceptor for CountingInterceptor {
        async fn before(&self, _request: &mut CallRequest) -> Result<()> {
            self.before.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn after(&self, _response: &CallResponse) -> Result<()> {
            self.after.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn echo_auth_server() -> Url {
        let router = Router::new().route(
            "/whoami",
            get(|headers: HeaderMap| async move {
                headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string()
            }),
        );
        let addr = spawn_router(router).await;
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_every_round_trip_runs_chain_once() {
        let base = echo_auth_server().await;
        let store = CredentialStore::new(Arc::new(FakeIssuer::new()));
        let counter = Arc::new(CountingInterceptor::default());
        let client = AuthorizedClient::new(&store, Audience::from_url(&base))
            .unwrap()
            .with_interceptor(counter.clone());
        let ctx = InvocationContext::new();

        for _ in 0..3 {
            let url = client.join(&base, "/whoami").unwrap();
            let resp = client
                .send(&ctx, CallRequest::new(Method::GET, url))
                .await
                .unwrap();
            let body = client.read_text(&ctx, resp).await.unwrap();
            assert!(body.starts_with("Bearer "));
        }
        assert_eq!(counter.before.load(Ordering::SeqCst), 3);
        assert_eq!(counter.after.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_sends_nothing() {
        let base = echo_auth_server().await;
        let store = CredentialStore::new(Arc::new(FakeIssuer::failing()));
        let counter = Arc::new(CountingInterceptor::default());
        let client = AuthorizedClient::new(&store, Audience::from_url(&base))
            .unwrap()
            .with_interceptor(counter.clone());

        let url = client.join(&base, "whoami").unwrap();
        let err = client
            .send(&InvocationContext::new(), CallRequest::new(Method::GET, url))
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert_eq!(counter.before.load(Ordering::SeqCst), 0);
        assert_eq!(counter.after.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_fetch_error() {
        let base = Url::parse("http://127.0.0.1:1").unwrap();
        let store = CredentialStore::new(Arc::new(FakeIssuer::new()));
        let client = AuthorizedClient::new(&store, Audience::from_url(&base)).unwrap();

        let url = client.join(&base, "whoami").unwrap();
        let err = client
            .send(&InvocationContext::new(), CallRequest::new(Method::GET, url))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Fetch { .. }));
    }

    #[test]
    fn test_join_stays_inside_audience() {
        let base = Url::parse("https://a.example.run.app/").unwrap();
        let store = CredentialStore::new(Arc::new(FakeIssuer::new()));
        let client = AuthorizedClient::new(&store, Audience::from_url(&base)).unwrap();

        let url = client.join(&base, "/.well-known/agent-card.json").unwrap();
        assert_eq!(url.as_str(), "https://a.example.run.app/.well-known/agent-card.json");

        let other = Url::parse("https://b.example.run.app").unwrap();
        assert!(client.join(&other, "x").is_err());
    }
}

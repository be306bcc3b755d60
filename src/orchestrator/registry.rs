//! Startup registration of peer agents and MCP toolsets.
//!
//! Each peer base address goes through descriptor fetch, an authorized
//! client scoped to the peer and an [`AgentTool`] wrapper. Peers are
//! registered concurrently; what happens when one of them fails is decided
//! by [`RegistrationPolicy`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};

use crate::a2a::card::fetch_agent_card;
use crate::a2a::client::A2AClient;
use crate::auth::{parse_http_url, Audience, CredentialStore};
use crate::context::InvocationContext;
use crate::error::{BridgeError, Result};
use crate::mcp::config::McpToolsetConfig;
use crate::tools::{AgentTool, Capability, McpToolset};
use crate::transport::client::DEFAULT_REQUEST_TIMEOUT;
use crate::transport::{AuthorizedClient, CallInterceptor, LoggingInterceptor};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do when a peer cannot be registered at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationPolicy {
    /// Abort startup on the first failing peer.
    #[default]
    FailFast,
    /// Exclude unreachable or misbehaving peers and carry on. Credential
    /// failures still abort.
    SkipUnreachable,
}

impl FromStr for RegistrationPolicy {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(Self::FailFast),
            "skip-unreachable" | "skip" => Ok(Self::SkipUnreachable),
            other => Err(BridgeError::Config(format!(
                "unknown registration policy '{}' (expected fail-fast or skip-unreachable)",
                other
            ))),
        }
    }
}

impl fmt::Display for RegistrationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail-fast"),
            Self::SkipUnreachable => write!(f, "skip-unreachable"),
        }
    }
}

#[derive(Clone)]
pub struct RegistrationOptions {
    pub policy: RegistrationPolicy,
    /// Return peer results verbatim instead of summarizing them.
    pub skip_summarization: bool,
    pub request_timeout: Duration,
    /// Interceptors appended after authentication on every client.
    pub interceptors: Vec<Arc<dyn CallInterceptor>>,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            policy: RegistrationPolicy::default(),
            skip_summarization: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            interceptors: vec![Arc::new(LoggingInterceptor)],
        }
    }
}

impl fmt::Debug for RegistrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationOptions")
            .field("policy", &self.policy)
            .field("skip_summarization", &self.skip_summarization)
            .field("request_timeout", &self.request_timeout)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl RegistrationOptions {
    pub fn with_policy(mut self, policy: RegistrationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_skip_summarization(mut self, skip: bool) -> Self {
        self.skip_summarization = skip;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_interceptors(mut self, interceptors: Vec<Arc<dyn CallInterceptor>>) -> Self {
        self.interceptors = interceptors;
        self
    }

    fn client(&self, store: &CredentialStore, audience: Audience) -> Result<AuthorizedClient> {
        let client = AuthorizedClient::with_timeout(store, audience, self.request_timeout)?;
        Ok(self
            .interceptors
            .iter()
            .cloned()
            .fold(client, AuthorizedClient::with_interceptor))
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A peer excluded under [`RegistrationPolicy::SkipUnreachable`].
#[derive(Debug)]
pub struct SkippedPeer {
    pub base: String,
    pub error: BridgeError,
}

#[derive(Debug, Default)]
pub struct RegistrationReport {
    /// Registered capabilities, in the order the bases were given.
    pub capabilities: Vec<Arc<dyn Capability>>,
    pub skipped: Vec<SkippedPeer>,
}

// ---------------------------------------------------------------------------
// Peer agents
// ---------------------------------------------------------------------------

/// Register one peer agent reachable at `base`.
pub async fn register_remote_agent(
    store: &CredentialStore,
    base: &str,
    options: &RegistrationOptions,
    ctx: &InvocationContext,
) -> Result<AgentTool> {
    let url = parse_http_url(base)?;
    let client = options.client(store, Audience::from_url(&url))?;
    let card = fetch_agent_card(&client, &url, ctx).await?;
    let a2a = A2AClient::new(card, client)?;
    log::info!("Registered remote agent '{}' at {}", a2a.name(), a2a.endpoint());
    Ok(AgentTool::new(Arc::new(a2a)).with_skip_summarization(options.skip_summarization))
}

/// Register every peer in `bases` concurrently.
pub async fn register_remote_agents(
    store: &CredentialStore,
    bases: &[String],
    options: &RegistrationOptions,
    ctx: &InvocationContext,
) -> Result<RegistrationReport> {
    let attempts = bases.iter().map(|base| async move {
        register_remote_agent(store, base, options, ctx)
            .await
            .map(|tool| Arc::new(tool) as Arc<dyn Capability>)
            .map_err(|e| (base.clone(), e))
    });

    match options.policy {
        RegistrationPolicy::FailFast => {
            let capabilities = try_join_all(attempts).await.map_err(|(base, e)| {
                log::error!("Failed to register remote agent at {}: {}", base, e);
                e
            })?;
            Ok(RegistrationReport {
                capabilities,
                skipped: Vec::new(),
            })
        }
        RegistrationPolicy::SkipUnreachable => {
            let mut report = RegistrationReport::default();
            for outcome in join_all(attempts).await {
                match outcome {
                    Ok(capability) => report.capabilities.push(capability),
                    Err((base, error)) if error.is_peer_excludable() => {
                        log::warn!("Skipping remote agent at {}: {}", base, error);
                        report.skipped.push(SkippedPeer { base, error });
                    }
                    Err((base, error)) => {
                        log::error!("Failed to register remote agent at {}: {}", base, error);
                        return Err(error);
                    }
                }
            }
            Ok(report)
        }
    }
}

// ---------------------------------------------------------------------------
// MCP toolsets
// ---------------------------------------------------------------------------

/// Discover the tools of one MCP server and wrap each as a capability.
pub async fn register_mcp_toolset(
    store: &CredentialStore,
    config: &McpToolsetConfig,
    options: &RegistrationOptions,
    ctx: &InvocationContext,
) -> Result<Vec<Arc<dyn Capability>>> {
    let host = config.host_url()?;
    let client = options.client(store, Audience::from_url(&host))?;
    let toolset = McpToolset::with_client(client, config)?;
    let tools = toolset.discover(ctx).await.map_err(|e| {
        log::error!(
            "Failed to discover tools on {}: {}",
            config.server_identifier(),
            e
        );
        e
    })?;

    log::info!(
        "Registered {} tools from {}: {}",
        tools.len(),
        config.server_identifier(),
        tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
    );
    Ok(tools
        .into_iter()
        .map(|tool| Arc::new(tool) as Arc<dyn Capability>)
        .collect())
}

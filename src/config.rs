//! Process configuration for the orchestrator binary.
//!
//! Values come from an optional YAML file named by `A2A_BRIDGE_CONFIG`,
//! overridden field by field by environment variables.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::auth::parse_http_url;
use crate::error::{BridgeError, Result};
use crate::mcp::config::McpToolsetConfig;
use crate::orchestrator::{RegistrationOptions, RegistrationPolicy};

pub const CONFIG_FILE_ENV: &str = "A2A_BRIDGE_CONFIG";
pub const PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";
pub const LOCATION_ENV: &str = "GOOGLE_CLOUD_LOCATION";
pub const PEER_URLS_ENV: &str = "A2A_PEER_URLS";
pub const MCP_HOST_ENV: &str = "MCP_HOST";
pub const MCP_ENDPOINT_ENV: &str = "MCP_ENDPOINT";
pub const REGISTRATION_POLICY_ENV: &str = "A2A_REGISTRATION_POLICY";
pub const SKIP_SUMMARIZATION_ENV: &str = "A2A_SKIP_SUMMARIZATION";
pub const REQUEST_TIMEOUT_ENV: &str = "A2A_REQUEST_TIMEOUT_SECS";
pub const PORT_ENV: &str = "PORT";

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_port() -> u16 {
    8080
}

/// Everything the orchestrator process needs at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Cloud project of the model client.
    #[serde(default)]
    pub project: String,
    /// Cloud location of the model client.
    #[serde(default)]
    pub location: String,
    /// Base addresses of peer agents.
    #[serde(default)]
    pub peer_urls: Vec<String>,
    #[serde(default)]
    pub mcp: Option<McpToolsetConfig>,
    #[serde(default)]
    pub registration_policy: RegistrationPolicy,
    #[serde(default = "default_true")]
    pub skip_summarization: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            location: String::new(),
            peer_urls: Vec::new(),
            mcp: None,
            registration_policy: RegistrationPolicy::default(),
            skip_summarization: default_true(),
            request_timeout_secs: default_request_timeout_secs(),
            port: default_port(),
        }
    }
}

impl BridgeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let base = match non_empty(vars, CONFIG_FILE_ENV) {
            Some(path) => Self::from_file(Path::new(path))
                .map_err(|e| BridgeError::Config(format!("{:#}", e)))?,
            None => Self::default(),
        };
        let config = base.with_overrides(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file. No validation or environment overrides.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    fn with_overrides(mut self, vars: &HashMap<String, String>) -> Result<Self> {
        if let Some(project) = non_empty(vars, PROJECT_ENV) {
            self.project = project.to_string();
        }
        if let Some(location) = non_empty(vars, LOCATION_ENV) {
            self.location = location.to_string();
        }
        if let Some(urls) = non_empty(vars, PEER_URLS_ENV) {
            self.peer_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(host) = non_empty(vars, MCP_HOST_ENV) {
            self.mcp = Some(match self.mcp.take() {
                Some(mut mcp) => {
                    mcp.host = host.to_string();
                    mcp
                }
                None => McpToolsetConfig::new(host),
            });
        }
        if let Some(endpoint) = non_empty(vars, MCP_ENDPOINT_ENV) {
            match self.mcp.as_mut() {
                Some(mcp) => mcp.endpoint = endpoint.to_string(),
                None => log::warn!("{} is set without an MCP host, ignoring", MCP_ENDPOINT_ENV),
            }
        }
        if let Some(policy) = non_empty(vars, REGISTRATION_POLICY_ENV) {
            self.registration_policy = policy.parse()?;
        }
        if let Some(skip) = non_empty(vars, SKIP_SUMMARIZATION_ENV) {
            self.skip_summarization = parse_bool(SKIP_SUMMARIZATION_ENV, skip)?;
        }
        if let Some(secs) = non_empty(vars, REQUEST_TIMEOUT_ENV) {
            self.request_timeout_secs = parse_number(REQUEST_TIMEOUT_ENV, secs)?;
        }
        if let Some(port) = non_empty(vars, PORT_ENV) {
            self.port = parse_number(PORT_ENV, port)?;
        }
        Ok(self)
    }

    /// Check required fields and addresses.
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(BridgeError::Config(format!("{} must be set", PROJECT_ENV)));
        }
        if self.location.trim().is_empty() {
            return Err(BridgeError::Config(format!("{} must be set", LOCATION_ENV)));
        }
        if self.request_timeout_secs == 0 {
            return Err(BridgeError::Config("request timeout must be positive".into()));
        }
        for url in &self.peer_urls {
            parse_http_url(url)?;
        }
        if let Some(mcp) = &self.mcp {
            mcp.host_url()?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn registration_options(&self) -> RegistrationOptions {
        RegistrationOptions::default()
            .with_policy(self.registration_policy)
            .with_skip_summarization(self.skip_summarization)
            .with_request_timeout(self.request_timeout())
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BridgeError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| BridgeError::Config(format!("{} is invalid ('{}'): {}", key, value, e)))
}

//! Audience-scoped identity tokens for outbound peer calls.
//!
//! - [`Audience`]: the normalized origin a token is minted for.
//! - [`IdToken`]: a short-lived bearer credential with a known expiry.
//! - [`IdTokenIssuer`]: anything that can mint tokens for an audience
//!   (metadata server, service-account key, a fixed token, or a fake in tests).
//! - [`CredentialStore`] / [`CredentialContext`]: process-scoped token caches,
//!   one context per audience, refreshed transparently before expiry.
//! - [`AuthInterceptor`]: the call interceptor that attaches the token.

pub mod credentials;
pub mod google;
pub mod interceptor;

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, BridgeError};

pub use credentials::{CredentialContext, CredentialStore, REFRESH_SKEW_SECS};
pub use google::{
    find_default_credentials, DefaultCredentialsOptions, MetadataServerIssuer,
    ServiceAccountIssuer, StaticTokenIssuer,
};
pub use interceptor::AuthInterceptor;

/// Lifetime assumed for tokens whose expiry cannot be read.
const FALLBACK_TOKEN_LIFETIME_SECS: i64 = 3600;

// ---------------------------------------------------------------------------
// Audience
// ---------------------------------------------------------------------------

/// The origin (`scheme://host[:port]`) an identity token is scoped to.
///
/// Tokens are never shared across audiences: one peer's token cannot be
/// presented to another peer's endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Audience(String);

impl Audience {
    /// Parse a peer base address or MCP host into its audience.
    pub fn parse(address: &str) -> Result<Self, BridgeError> {
        let url = parse_http_url(address)?;
        Ok(Self::from_url(&url))
    }

    /// The audience of an already-parsed URL.
    pub fn from_url(url: &Url) -> Self {
        Self(url.origin().ascii_serialization())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `url` points at this audience's origin.
    pub fn matches(&self, url: &Url) -> bool {
        url.origin().ascii_serialization() == self.0
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse an HTTP(S) address, rejecting other schemes and host-less URLs.
pub fn parse_http_url(address: &str) -> Result<Url, BridgeError> {
    let url = Url::parse(address.trim())
        .map_err(|e| BridgeError::Config(format!("invalid address '{}': {}", address, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BridgeError::Config(format!(
            "address '{}' must use http or https",
            address
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(BridgeError::Config(format!(
            "address '{}' has no host",
            address
        )));
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// IdToken
// ---------------------------------------------------------------------------

/// A bearer identity token and the instant it stops being accepted.
#[derive(Clone)]
pub struct IdToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

impl IdToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Build a token from a compact JWT, reading expiry from its `exp` claim.
    ///
    /// Opaque or undecodable tokens are given a one hour lifetime.
    pub fn from_jwt(value: impl Into<String>) -> Self {
        let value = value.into();
        let expires_at = jwt_expiry(&value)
            .unwrap_or_else(|| Utc::now() + Duration::seconds(FALLBACK_TOKEN_LIFETIME_SECS));
        Self { value, expires_at }
    }

    /// The raw token. Never log this.
    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is still valid at `now` with `skew` to spare.
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now + skew < self.expires_at
    }
}

fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claim.exp?, 0)
}

// ---------------------------------------------------------------------------
// IdTokenIssuer
// ---------------------------------------------------------------------------

/// Mints identity tokens for an audience.
///
/// Implementations must be safe to call repeatedly and concurrently; caching
/// and refresh policy live in [`CredentialContext`], not here.
#[async_trait]
pub trait IdTokenIssuer: Send + Sync {
    async fn issue(&self, audience: &Audience) -> Result<IdToken, AuthError>;

    /// Short label used in logs.
    fn kind(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_exp(exp: i64) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = engine.encode(format!(r#"{{"aud":"https://a.run.app","exp":{}}}"#, exp));
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_audience_is_origin() {
        let aud = Audience::parse("https://time-agent.example.run.app/").unwrap();
        assert_eq!(aud.as_str(), "https://time-agent.example.run.app");

        let aud = Audience::parse("http://127.0.0.1:8080/mcp").unwrap();
        assert_eq!(aud.as_str(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_audience_matches_only_its_origin() {
        let aud = Audience::parse("https://a.example.run.app").unwrap();
        assert!(aud.matches(&Url::parse("https://a.example.run.app/rpc").unwrap()));
        assert!(!aud.matches(&Url::parse("https://b.example.run.app/rpc").unwrap()));
        assert!(!aud.matches(&Url::parse("http://a.example.run.app/rpc").unwrap()));
    }

    #[test]
    fn test_parse_rejects_non_http() {
        assert!(matches!(
            Audience::parse("ftp://example.com"),
            Err(BridgeError::Config(_))
        ));
        assert!(matches!(
            Audience::parse("not a url"),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_id_token_reads_exp_claim() {
        let exp = Utc::now().timestamp() + 600;
        let token = IdToken::from_jwt(jwt_with_exp(exp));
        assert_eq!(token.expires_at().timestamp(), exp);
        assert!(token.is_valid_at(Utc::now(), Duration::seconds(300)));
        assert!(!token.is_valid_at(Utc::now(), Duration::seconds(900)));
    }

    #[test]
    fn test_opaque_token_gets_fallback_lifetime() {
        let token = IdToken::from_jwt("opaque-token");
        let remaining = token.expires_at() - Utc::now();
        assert!(remaining > Duration::seconds(3500));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let token = IdToken::new("super-secret", Utc::now());
        assert!(!format!("{:?}", token).contains("super-secret"));
    }
}

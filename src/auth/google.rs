//! Ambient default credentials.
//!
//! Identity tokens are minted from whatever the execution environment
//! provides, checked in this order:
//!
//! 1. `A2A_BRIDGE_ID_TOKEN` — a fixed token, for local development.
//! 2. `GOOGLE_APPLICATION_CREDENTIALS` — a service-account key file; a signed
//!    JWT assertion is exchanged at the key's `token_uri` for an ID token.
//! 3. The compute metadata server (Cloud Run, GCE, GKE).
//!
//! If none is available, [`find_default_credentials`] fails with
//! [`AuthError::NoDefaultCredentials`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::{Audience, IdToken, IdTokenIssuer};
use crate::error::AuthError;

/// Env var holding a fixed identity token.
pub const ID_TOKEN_ENV: &str = "A2A_BRIDGE_ID_TOKEN";
/// Env var naming a service-account key file.
pub const CREDENTIALS_FILE_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Env var overriding the metadata server host.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const METADATA_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const ISSUE_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Where to look for ambient credentials.
#[derive(Debug, Clone)]
pub struct DefaultCredentialsOptions {
    /// Fixed token to use for every audience.
    pub id_token: Option<String>,
    /// Service-account key file.
    pub credentials_file: Option<PathBuf>,
    /// Metadata server host (`host[:port]`).
    pub metadata_host: String,
}

impl Default for DefaultCredentialsOptions {
    fn default() -> Self {
        Self {
            id_token: None,
            credentials_file: None,
            metadata_host: DEFAULT_METADATA_HOST.to_string(),
        }
    }
}

impl DefaultCredentialsOptions {
    /// Read the standard environment variables.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            id_token: non_empty(ID_TOKEN_ENV),
            credentials_file: non_empty(CREDENTIALS_FILE_ENV).map(PathBuf::from),
            metadata_host: non_empty(METADATA_HOST_ENV)
                .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string()),
        }
    }
}

/// Locate ambient credentials and return an issuer bound to them.
pub async fn find_default_credentials(
    options: &DefaultCredentialsOptions,
) -> Result<Arc<dyn IdTokenIssuer>, AuthError> {
    if let Some(token) = &options.id_token {
        log::info!("Using fixed identity token from {}", ID_TOKEN_ENV);
        return Ok(Arc::new(StaticTokenIssuer::new(token.clone())));
    }

    if let Some(path) = &options.credentials_file {
        log::info!("Using service account key from {}", path.display());
        return Ok(Arc::new(ServiceAccountIssuer::from_file(path)?));
    }

    let metadata = MetadataServerIssuer::new(options.metadata_host.clone());
    if metadata.probe().await {
        log::info!("Using metadata server at {}", options.metadata_host);
        return Ok(Arc::new(metadata));
    }

    Err(AuthError::NoDefaultCredentials {
        reason: format!(
            "{} and {} are unset and no metadata server answered at {}",
            ID_TOKEN_ENV, CREDENTIALS_FILE_ENV, options.metadata_host
        ),
    })
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::InvalidCredentials {
            message: format!("failed to build HTTP client: {}", e),
        })
}

// ---------------------------------------------------------------------------
// StaticTokenIssuer
// ---------------------------------------------------------------------------

/// Hands out the same token for every audience.
#[derive(Clone)]
pub struct StaticTokenIssuer {
    token: String,
}

impl StaticTokenIssuer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl IdTokenIssuer for StaticTokenIssuer {
    async fn issue(&self, _audience: &Audience) -> Result<IdToken, AuthError> {
        Ok(IdToken::from_jwt(self.token.clone()))
    }

    fn kind(&self) -> &'static str {
        "static"
    }
}

// ---------------------------------------------------------------------------
// MetadataServerIssuer
// ---------------------------------------------------------------------------

/// Mints ID tokens from the compute metadata server.
pub struct MetadataServerIssuer {
    host: String,
    http: reqwest::Client,
}

impl MetadataServerIssuer {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            http: reqwest::Client::new(),
        }
    }

    fn base(&self) -> String {
        format!("http://{}/computeMetadata/v1", self.host.trim_end_matches('/'))
    }

    /// Whether a metadata server answers at the configured host.
    pub async fn probe(&self) -> bool {
        let request = self
            .http
            .get(format!("{}/", self.base()))
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_PROBE_TIMEOUT);
        match request.send().await {
            Ok(resp) => resp
                .headers()
                .get("Metadata-Flavor")
                .and_then(|v| v.to_str().ok())
                .map_or(false, |v| v.eq_ignore_ascii_case("google")),
            Err(e) => {
                log::debug!("Metadata server probe failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl IdTokenIssuer for MetadataServerIssuer {
    async fn issue(&self, audience: &Audience) -> Result<IdToken, AuthError> {
        let url = format!(
            "{}/instance/service-accounts/default/identity",
            self.base()
        );
        let issuance = |message: String| AuthError::Issuance {
            audience: audience.to_string(),
            message,
        };

        let resp = self
            .http
            .get(&url)
            .query(&[("audience", audience.as_str()), ("format", "full")])
            .header("Metadata-Flavor", "Google")
            .timeout(ISSUE_TIMEOUT)
            .send()
            .await
            .map_err(|e| issuance(format!("metadata server unreachable: {}", e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| issuance(format!("failed to read metadata response: {}", e)))?;
        if !status.is_success() {
            return Err(issuance(format!("metadata server returned {}: {}", status, body)));
        }

        let token = body.trim();
        if token.is_empty() {
            return Err(issuance("metadata server returned an empty token".to_string()));
        }
        Ok(IdToken::from_jwt(token))
    }

    fn kind(&self) -> &'static str {
        "metadata-server"
    }
}

// ---------------------------------------------------------------------------
// ServiceAccountIssuer
// ---------------------------------------------------------------------------

/// The subset of a service-account key file needed to mint ID tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    target_audience: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    id_token: Option<String>,
}

/// Mints ID tokens by exchanging a signed service-account assertion.
pub struct ServiceAccountIssuer {
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    http: reqwest::Client,
}

impl ServiceAccountIssuer {
    /// Load a key file. Only `service_account` keys can mint ID tokens for an
    /// arbitrary audience.
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let raw = std::fs::read_to_string(path).map_err(|e| AuthError::InvalidCredentials {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AuthError> {
        let key: ServiceAccountKey =
            serde_json::from_str(raw).map_err(|e| AuthError::InvalidCredentials {
                message: format!("malformed credentials file: {}", e),
            })?;
        if key.key_type != "service_account" {
            return Err(AuthError::InvalidCredentials {
                message: format!(
                    "credentials of type '{}' cannot mint identity tokens",
                    key.key_type
                ),
            });
        }
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            AuthError::InvalidCredentials {
                message: format!("invalid private key: {}", e),
            }
        })?;
        Ok(Self {
            key,
            signing_key,
            http: http_client(ISSUE_TIMEOUT)?,
        })
    }

    fn assertion(&self, audience: &Audience) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            sub: &self.key.client_email,
            aud: &self.key.token_uri,
            target_audience: audience.as_str(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        encode(&header, &claims, &self.signing_key).map_err(|e| AuthError::Issuance {
            audience: audience.to_string(),
            message: format!("failed to sign assertion: {}", e),
        })
    }
}

#[async_trait]
impl IdTokenIssuer for ServiceAccountIssuer {
    async fn issue(&self, audience: &Audience) -> Result<IdToken, AuthError> {
        let issuance = |message: String| AuthError::Issuance {
            audience: audience.to_string(),
            message,
        };
        let assertion = self.assertion(audience)?;

        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| issuance(format!("token endpoint unreachable: {}", e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| issuance(format!("failed to read token response: {}", e)))?;
        if !status.is_success() {
            return Err(issuance(format!("token endpoint returned {}: {}", status, body)));
        }

        let parsed: TokenExchangeResponse = serde_json::from_str(&body)
            .map_err(|e| issuance(format!("malformed token response: {}", e)))?;
        let id_token = parsed
            .id_token
            .ok_or_else(|| issuance("token response has no id_token".to_string()))?;
        Ok(IdToken::from_jwt(id_token))
    }

    fn kind(&self) -> &'static str {
        "service-account"
    }
}

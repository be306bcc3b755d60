//! Bearer-token call interceptor.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;

use super::CredentialContext;
use crate::error::{AuthError, Result};
use crate::transport::{CallInterceptor, CallRequest, CallResponse};

/// Attaches `Authorization: Bearer {token}` for exactly one audience.
///
/// Requests aimed at any other origin are refused before a token is read.
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    credentials: Arc<CredentialContext>,
}

impl AuthInterceptor {
    pub fn new(credentials: Arc<CredentialContext>) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &Arc<CredentialContext> {
        &self.credentials
    }
}

#[async_trait]
impl CallInterceptor for AuthInterceptor {
    async fn before(&self, request: &mut CallRequest) -> Result<()> {
        let audience = self.credentials.audience();
        if !audience.matches(&request.url) {
            return Err(AuthError::AudienceMismatch {
                audience: audience.to_string(),
                target: request.url.to_string(),
            }
            .into());
        }

        let token = self.credentials.token().await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.secret())).map_err(
            |_| AuthError::InvalidHeader {
                audience: audience.to_string(),
            },
        )?;
        value.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    async fn after(&self, response: &CallResponse) -> Result<()> {
        if response.status == StatusCode::UNAUTHORIZED {
            log::warn!(
                "{} rejected the identity token for '{}'; forcing refresh on next call",
                response.url,
                self.credentials.audience()
            );
            self.credentials.invalidate();
        }
        Ok(())
    }
}

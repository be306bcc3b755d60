//! Per-audience token caches.
//!
//! A [`CredentialContext`] is created lazily the first time an audience is
//! used and lives as long as its [`CredentialStore`]. Readers take the fast
//! path through a `parking_lot` read lock; refresh is single-flighted per
//! audience so that a burst of concurrent calls triggers one issuance and
//! never blocks calls to other audiences.

use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{Audience, IdToken, IdTokenIssuer};
use crate::error::AuthError;

/// Tokens closer than this to expiry are refreshed before use.
pub const REFRESH_SKEW_SECS: i64 = 300;

// ---------------------------------------------------------------------------
// CredentialContext
// ---------------------------------------------------------------------------

/// Cached identity token for a single audience.
pub struct CredentialContext {
    audience: Audience,
    issuer: Arc<dyn IdTokenIssuer>,
    cached: RwLock<Option<IdToken>>,
    refresh: tokio::sync::Mutex<()>,
    skew: Duration,
}

impl fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialContext")
            .field("audience", &self.audience)
            .field("issuer", &self.issuer.kind())
            .field("cached", &self.cached.read().is_some())
            .finish()
    }
}

impl CredentialContext {
    pub fn new(audience: Audience, issuer: Arc<dyn IdTokenIssuer>) -> Self {
        Self {
            audience,
            issuer,
            cached: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
            skew: Duration::seconds(REFRESH_SKEW_SECS),
        }
    }

    /// Override the refresh skew.
    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn audience(&self) -> &Audience {
        &self.audience
    }

    /// Return a token that is valid for at least the refresh skew, issuing a
    /// new one when the cached token is missing or close to expiry.
    pub async fn token(&self) -> Result<IdToken, AuthError> {
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        let _refreshing = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        log::debug!(
            "Issuing identity token: audience='{}', issuer='{}'",
            self.audience,
            self.issuer.kind()
        );
        let token = self.issuer.issue(&self.audience).await?;
        if !token.is_valid_at(Utc::now(), Duration::zero()) {
            return Err(AuthError::ExpiredToken {
                audience: self.audience.to_string(),
            });
        }
        if !token.is_valid_at(Utc::now(), self.skew) {
            log::warn!(
                "Identity token for '{}' expires within the refresh window ({})",
                self.audience,
                token.expires_at()
            );
        }

        *self.cached.write() = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call issues a fresh one.
    pub fn invalidate(&self) {
        if self.cached.write().take().is_some() {
            log::debug!("Invalidated identity token for '{}'", self.audience);
        }
    }

    fn fresh_cached(&self) -> Option<IdToken> {
        self.cached
            .read()
            .as_ref()
            .filter(|token| token.is_valid_at(Utc::now(), self.skew))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Process-scoped registry of credential contexts, one per audience.
///
/// Cheap to clone; clones share the same contexts. Construct one per process
/// (or per test, with a fake issuer) and pass it to everything that makes
/// authenticated calls.
#[derive(Clone)]
pub struct CredentialStore {
    issuer: Arc<dyn IdTokenIssuer>,
    contexts: Arc<DashMap<Audience, Arc<CredentialContext>>>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("issuer", &self.issuer.kind())
            .field("audiences", &self.contexts.len())
            .finish()
    }
}

impl CredentialStore {
    pub fn new(issuer: Arc<dyn IdTokenIssuer>) -> Self {
        Self {
            issuer,
            contexts: Arc::new(DashMap::new()),
        }
    }

    /// The context for `audience`, created on first use.
    pub fn context(&self, audience: &Audience) -> Arc<CredentialContext> {
        self.contexts
            .entry(audience.clone())
            .or_insert_with(|| {
                log::debug!("Creating credential context for '{}'", audience);
                Arc::new(CredentialContext::new(
                    audience.clone(),
                    Arc::clone(&self.issuer),
                ))
            })
            .clone()
    }

    /// Number of audiences seen so far.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

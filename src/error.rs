//! Error taxonomy for the remote-capability bridge.
//!
//! Registration-time failures (`Fetch`, `PeerRejected`, `Decode`) are
//! resolved once at startup. Per-call failures (`Auth`, `Invocation`) are
//! surfaced to the turn that issued the call. The bridge never retries on
//! its own beyond transparent credential refresh.

use thiserror::Error;

/// Failures while issuing or attaching identity tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No ambient credentials could be located in the execution environment.
    #[error("could not find default credentials: {reason}")]
    NoDefaultCredentials { reason: String },

    /// A credentials file exists but cannot be used to mint identity tokens.
    #[error("invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// The token issuer failed to produce a token for the audience.
    #[error("failed to issue identity token for {audience}: {message}")]
    Issuance { audience: String, message: String },

    /// The issuer handed back a token that had already expired.
    #[error("identity token for {audience} expired before it could be attached")]
    ExpiredToken { audience: String },

    /// A request was routed to an origin other than the credential's audience.
    #[error("token scoped to {audience} cannot authorize a call to {target}")]
    AudienceMismatch { audience: String, target: String },

    /// The token could not be encoded as an HTTP header value.
    #[error("identity token for {audience} is not a valid header value")]
    InvalidHeader { audience: String },

    /// The peer refused the attached credential.
    #[error("peer {audience} rejected credentials with HTTP {status}")]
    Rejected { audience: String, status: u16 },
}

/// Top-level error for discovery, registration and invocation.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Transport-level failure reaching a peer.
    #[error("failed to reach {peer}: {message}")]
    Fetch { peer: String, message: String },

    /// The peer answered with a non-success status.
    #[error("{peer} responded with HTTP {status}: {body}")]
    PeerRejected {
        peer: String,
        status: u16,
        body: String,
    },

    /// The peer's response body could not be decoded.
    #[error("malformed response from {peer}: {message}")]
    Decode { peer: String, message: String },

    /// The MCP server no longer recognises the session the call was sent on.
    #[error("session with {peer} has expired")]
    SessionExpired { peer: String },

    /// Credential issuance or attachment failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The reasoning loop selected a capability that was never registered.
    #[error("unknown capability '{name}'")]
    UnknownCapability { name: String },

    /// The backing peer or toolset reported an application-level failure.
    #[error("capability '{capability}' failed: {message}")]
    Invocation {
        capability: String,
        message: String,
    },

    /// Two capabilities were registered under the same name.
    #[error("duplicate capability name '{name}'")]
    DuplicateCapability { name: String },

    /// Invalid addresses, descriptors or process configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller cancelled the call.
    #[error("call cancelled")]
    Cancelled,

    /// The caller's deadline passed before the call completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

impl BridgeError {
    /// Build a `Fetch` error from a transport failure.
    pub fn fetch(peer: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            peer: peer.into(),
            message: err.to_string(),
        }
    }

    /// Build a `Decode` error.
    pub fn decode(peer: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            peer: peer.into(),
            message: err.to_string(),
        }
    }

    /// Build an `Invocation` error.
    pub fn invocation(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invocation {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from credential issuance or attachment.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Whether a registration failure may be handled by excluding the peer.
    ///
    /// Auth and configuration failures are never excludable: a process must
    /// not run with an unauthenticated or misconfigured peer set.
    pub fn is_peer_excludable(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. }
                | Self::PeerRejected { .. }
                | Self::Decode { .. }
                | Self::SessionExpired { .. }
        )
    }

    /// Whether the error should abort the whole turn instead of being fed
    /// back to the reasoning loop as a tool failure.
    pub fn is_fatal_to_turn(&self) -> bool {
        matches!(
            self,
            Self::UnknownCapability { .. }
                | Self::Auth(_)
                | Self::Cancelled
                | Self::DeadlineExceeded
                | Self::Config(_)
        )
    }
}

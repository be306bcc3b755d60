//! Agent card discovery.

use reqwest::{Method, Url};

use super::types::AgentCard;
use crate::context::InvocationContext;
use crate::error::{BridgeError, Result};
use crate::transport::{AuthorizedClient, CallRequest};

/// Well-known path of a peer's capability descriptor.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

/// Fetch and decode the agent card published by the peer at `base`.
///
/// The request carries an identity token for `base`'s origin. Nothing is
/// cached: every call is one network round trip.
pub async fn fetch_agent_card(
    client: &AuthorizedClient,
    base: &Url,
    ctx: &InvocationContext,
) -> Result<AgentCard> {
    let peer = base.as_str().trim_end_matches('/').to_string();
    let url = client.join(base, AGENT_CARD_PATH)?;
    log::debug!("Fetching agent card from {}", url);

    let request =
        CallRequest::new(Method::GET, url).with_header("content-type", "application/json");
    let response = client.send(ctx, request).await?;
    let status = response.status();
    let body = client.read_text(ctx, response).await?;

    if !status.is_success() {
        return Err(BridgeError::PeerRejected {
            peer,
            status: status.as_u16(),
            body,
        });
    }

    let mut card: AgentCard =
        serde_json::from_str(&body).map_err(|e| BridgeError::decode(&peer, e))?;
    if card.name.trim().is_empty() {
        return Err(BridgeError::decode(&peer, "agent card has an empty name"));
    }
    if card.url.trim().is_empty() {
        card.url = peer.clone();
    }

    log::info!(
        "Discovered agent '{}' at {} ({} skills, streaming: {})",
        card.name,
        peer,
        card.skills.len(),
        card.capabilities.streaming
    );
    Ok(card)
}

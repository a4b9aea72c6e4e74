//! WebSocket message dispatch
//!
//! Resolves which session a message targets, calls into the registry and
//! turns the outcome into the direct reply for the sender. Session-wide
//! effects reach clients through the outbox instead.

use std::sync::Arc;

use super::Identity;
use crate::error::Rejection;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::SessionRegistry;
use crate::types::SessionKey;

/// Unwrap an accepted result or reply with the rejection
macro_rules! accept {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Rejected: {}", e);
                return Some(ServerMessage::from(e));
            }
        }
    };
}

/// Session for gameplay messages: the followed chat, or wherever the sender is seated
async fn gameplay_session(identity: &Identity, registry: &SessionRegistry) -> Result<SessionKey, Rejection> {
    if let Some(key) = &identity.session {
        return Ok(key.clone());
    }
    registry
        .session_of(identity.id)
        .await
        .ok_or(Rejection::NotInSession)
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    identity: &Identity,
    registry: &Arc<SessionRegistry>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Join => {
            let key = accept!(identity.session.clone().ok_or(Rejection::NotInSession));
            registry.create_or_get(&key).await;
            let seated = accept!(
                registry
                    .add_participant(
                        &key,
                        identity.id,
                        identity.display_name.clone(),
                        identity.username.clone(),
                    )
                    .await
            );
            Some(ServerMessage::Joined {
                session: key,
                seated,
            })
        }

        ClientMessage::Leave => {
            let key = accept!(identity.session.clone().ok_or(Rejection::NotInSession));
            accept!(registry.remove_participant(&key, identity.id).await);
            Some(ServerMessage::Left { session: key })
        }

        ClientMessage::Start => {
            let key = accept!(identity.session.clone().ok_or(Rejection::NotInSession));
            tracing::info!(session = %key, participant = identity.id, "Start requested");
            // Start and the role messages go out through the outbox
            accept!(registry.start(&key).await);
            None
        }

        ClientMessage::NightAction { action, target } => {
            let key = accept!(gameplay_session(identity, registry).await);
            accept!(
                registry
                    .submit_night_action(&key, identity.id, action, target)
                    .await
            );
            Some(ServerMessage::ActionAccepted { action })
        }

        ClientMessage::Vote { target } => {
            let key = accept!(gameplay_session(identity, registry).await);
            accept!(registry.submit_vote(&key, identity.id, target).await);
            Some(ServerMessage::VoteAccepted)
        }

        ClientMessage::MafiaChat { text } => {
            let recipients = accept!(registry.relay(identity.id, text).await);
            Some(ServerMessage::MafiaChatSent { recipients })
        }

        ClientMessage::EndGame => {
            let key = accept!(identity.session.clone().ok_or(Rejection::NotInSession));
            tracing::info!(session = %key, participant = identity.id, "End requested");
            accept!(registry.force_end(&key).await);
            None
        }
    }
}

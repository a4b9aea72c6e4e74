//! Outbound delivery seam between the engine and whatever transport carries
//! messages to participants.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use crate::protocol::ServerMessage;
use crate::types::{ParticipantId, SessionKey};

/// Something that can put engine output in front of people.
#[async_trait]
pub trait Courier: Send + Sync {
    /// Announce to everybody following a session
    async fn publish(&self, session: &SessionKey, msg: ServerMessage);

    /// Private message to one participant. `false` means it could not be delivered.
    async fn deliver(&self, to: ParticipantId, msg: ServerMessage) -> bool;
}

/// One message on the outbox channel, addressed either to a session or to a participant
#[derive(Debug, Clone)]
pub struct Envelope {
    pub session: Option<SessionKey>,
    pub to: Option<ParticipantId>,
    pub message: ServerMessage,
}

impl Envelope {
    /// Whether a connection for `participant` following `session` should see this
    pub fn is_for(&self, participant: ParticipantId, session: Option<&SessionKey>) -> bool {
        match (self.to, &self.session) {
            (Some(to), _) => to == participant,
            (None, Some(key)) => session == Some(key),
            (None, None) => false,
        }
    }
}

/// In-process courier: a broadcast channel that every WebSocket connection
/// subscribes to, plus the set of participants with at least one open connection.
pub struct Outbox {
    tx: broadcast::Sender<Envelope>,
    online: RwLock<HashMap<ParticipantId, usize>>,
}

impl Outbox {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            tx,
            online: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub async fn mark_online(&self, id: ParticipantId) {
        *self.online.write().await.entry(id).or_insert(0) += 1;
    }

    pub async fn mark_offline(&self, id: ParticipantId) {
        let mut online = self.online.write().await;
        if let Some(count) = online.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                online.remove(&id);
            }
        }
    }

    pub async fn is_online(&self, id: ParticipantId) -> bool {
        self.online.read().await.contains_key(&id)
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Courier for Outbox {
    async fn publish(&self, session: &SessionKey, msg: ServerMessage) {
        // No receivers connected is fine
        let _ = self.tx.send(Envelope {
            session: Some(session.clone()),
            to: None,
            message: msg,
        });
    }

    async fn deliver(&self, to: ParticipantId, msg: ServerMessage) -> bool {
        if !self.is_online(to).await {
            tracing::warn!(participant = to, "Private delivery failed, participant offline");
            return false;
        }
        // Reachability is the online mark, not the current subscriber count
        let _ = self.tx.send(Envelope {
            session: None,
            to: Some(to),
            message: msg,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_requires_online_participant() {
        let outbox = Outbox::new();
        let mut rx = outbox.subscribe();

        assert!(!outbox.deliver(1, ServerMessage::VoteAccepted).await);

        outbox.mark_online(1).await;
        assert!(outbox.deliver(1, ServerMessage::VoteAccepted).await);
        let env = rx.recv().await.unwrap();
        assert!(env.is_for(1, None));
        assert!(!env.is_for(2, None));
    }

    #[tokio::test]
    async fn test_online_participant_is_reachable_without_subscribers() {
        let outbox = Outbox::new();
        outbox.mark_online(3).await;
        assert!(outbox.deliver(3, ServerMessage::VoteAccepted).await);

        outbox.mark_offline(3).await;
        assert!(!outbox.deliver(3, ServerMessage::VoteAccepted).await);
    }

    #[tokio::test]
    async fn test_online_is_counted_per_connection() {
        let outbox = Outbox::new();
        outbox.mark_online(1).await;
        outbox.mark_online(1).await;
        outbox.mark_offline(1).await;
        assert!(outbox.is_online(1).await);
        outbox.mark_offline(1).await;
        assert!(!outbox.is_online(1).await);
    }

    #[tokio::test]
    async fn test_publish_reaches_session_followers_only() {
        let outbox = Outbox::new();
        let mut rx = outbox.subscribe();
        let key: SessionKey = "chat_1".into();

        outbox
            .publish(&key, ServerMessage::AllActionsReceived { session: key.clone() })
            .await;
        let env = rx.recv().await.unwrap();
        assert!(env.is_for(5, Some(&key)));
        assert!(!env.is_for(5, None));
        assert!(!env.is_for(5, Some(&"chat_2".to_string())));
    }
}

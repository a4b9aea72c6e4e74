pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::app::AppState;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::types::{ParticipantId, SessionKey};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub id: ParticipantId,
    /// Chat/topic the connection follows; absent for a private-only channel
    pub session: Option<SessionKey>,
    pub name: Option<String>,
    pub username: Option<String>,
}

/// Who is on the other end of a connection
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: ParticipantId,
    pub session: Option<SessionKey>,
    pub display_name: String,
    pub username: Option<String>,
}

impl From<WsQuery> for Identity {
    fn from(q: WsQuery) -> Self {
        let display_name = q
            .name
            .or_else(|| q.username.clone())
            .unwrap_or_else(|| q.id.to_string());
        Self {
            id: q.id,
            session: q.session,
            display_name,
            username: q.username,
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!(
        "WebSocket connection request: id={}, session={:?}",
        params.id,
        params.session
    );

    let identity = Identity::from(params);
    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before announcing reachability so no private message slips past
    let mut outbox_rx = state.outbox.subscribe();
    state.outbox.mark_online(identity.id).await;

    let welcome = ServerMessage::Welcome {
        protocol: "1.0".to_string(),
        participant: identity.id,
        session: identity.session.clone(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };
    if !send_json(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        state.outbox.mark_offline(identity.id).await;
        return;
    }

    loop {
        tokio::select! {
            envelope = outbox_rx.recv() => {
                match envelope {
                    Ok(env) if env.is_for(identity.id, identity.session.as_ref()) => {
                        if !send_json(&mut sender, &env.message).await {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(participant = identity.id, skipped, "Connection lagging behind outbox");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &identity, &state.registry).await
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                Some(ServerMessage::error(
                                    "PARSE_ERROR",
                                    format!("Invalid message format: {}", e),
                                ))
                            }
                        };
                        if let Some(response) = response {
                            if !send_json(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.outbox.mark_offline(identity.id).await;
    tracing::info!("WebSocket connection closed for participant {}", identity.id);
}

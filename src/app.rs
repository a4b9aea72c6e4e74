use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::GameConfig;
use crate::courier::Outbox;
use crate::registry::SessionRegistry;
use crate::{api, ws};

/// Shared server state handed to every axum handler
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    /// Same outbox the registry delivers through; connections subscribe to it
    pub outbox: Arc<Outbox>,
}

impl AppState {
    pub fn new(config: GameConfig) -> Self {
        let outbox = Arc::new(Outbox::new());
        let registry = Arc::new(SessionRegistry::new(Arc::new(config), outbox.clone()));
        Self { registry, outbox }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/health", get(api::health))
        .route("/api/sessions", get(api::list_sessions))
        .route(
            "/api/sessions/{key}",
            get(api::get_session).delete(api::end_session),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

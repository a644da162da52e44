//! HTTP router: the terminal WebSocket upgrade plus the operational
//! surface (health check, session listing, session force-kill).

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::session::{SessionRegistry, SessionSummary};
use crate::terminal::{self, TerminalQuery};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    /// Build state from a validated configuration.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.idle_timeout()));
        Self {
            config: Arc::new(config),
            registry,
        }
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}/kill", post(kill_session))
        .route("/ws/pty", get(terminal_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.list())
}

async fn kill_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.registry.kill_and_remove(&id).await {
        Json(serde_json::json!({ "ok": true })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "No such session" })),
        )
            .into_response()
    }
}

async fn terminal_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<TerminalQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| terminal::handle_socket(socket, query, state))
}

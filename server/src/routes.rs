use axum::{
    routing::{get, post},
    Router,
};

use crate::dm::messages;
use crate::presence::handlers as presence_handlers;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    let message_routes = Router::new()
        .route(
            "/api/messages/send/{receiver_id}",
            post(messages::send_message),
        )
        .route("/api/messages/{user_id}", get(messages::get_messages));

    let presence_routes =
        Router::new().route("/api/presence", get(presence_handlers::get_online_users));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler::ws_upgrade))
        .merge(message_routes)
        .merge(presence_routes)
        .with_state(state)
}

mod chat;
mod health;
mod pipeline;
mod user;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Origin-allowlist-or-`Any` split (§6 "CORS allowed origins").
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.file_config.cors_allowed_origins);

    Router::new()
        .route("/health", get(health::health))
        .route("/pipeline/process", post(pipeline::process))
        .route("/pipeline/quick", post(pipeline::quick))
        .route("/pipeline/status/{runId}", get(pipeline::status))
        .route("/chat", post(chat::chat))
        .route("/chat/{sessionId}", get(chat::get_session))
        .route("/chat/{sessionId}", delete(chat::delete_session))
        .route("/user/{id}/profile", get(user::get_profile))
        .route("/user/{id}/profile", put(user::put_profile))
        .route("/user/{id}/interaction", post(user::post_interaction))
        .route("/user/{id}/memory", delete(user::delete_memory))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

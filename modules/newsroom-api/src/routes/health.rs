use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct Health {
    status: &'static str,
    database: &'static str,
}

/// Liveness + per-provider reachability summary (§6). A single lightweight
/// query stands in for "database reachable"; provider reachability beyond
/// that would mean a live outbound call per health check, which is the kind
/// of thing that gets a service rate-limited by its own monitoring.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    let database = match state.runs.get("__healthcheck__").await {
        Ok(_) => "ok",
        Err(_) => "unreachable",
    };
    Json(Health { status: "ok", database })
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use newsroom_common::types::{InteractionAction, StylePreferences, UserProfile};

use crate::error::{ok, ApiError, ApiResult, SuccessBody};
use crate::state::AppState;

/// `GET /user/{id}/profile` (§6).
pub async fn get_profile(State(state): State<Arc<AppState>>, Path(user_id): Path<String>) -> ApiResult<Json<SuccessBody<UserProfile>>> {
    let profile = state.memory.get_profile(&user_id).await.map_err(|e| ApiError(e.to_newsroom()))?;
    Ok(ok(profile))
}

/// `PUT /user/{id}/profile` (§6): the only writable slice of a profile is
/// style — `interest_vector`/`category_weights`/`counters` are derived from
/// interactions, not set directly (§4.7).
pub async fn put_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(style): Json<StylePreferences>,
) -> ApiResult<Json<SuccessBody<UserProfile>>> {
    let profile = state.memory.set_style(&user_id, style).await.map_err(|e| ApiError(e.to_newsroom()))?;
    Ok(ok(profile))
}

#[derive(serde::Deserialize)]
pub struct InteractionBody {
    pub action: InteractionAction,
    pub target: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub importance: f32,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// `POST /user/{id}/interaction` (§6, §4.7): append-only interaction log.
pub async fn post_interaction(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<InteractionBody>,
) -> ApiResult<Json<SuccessBody<()>>> {
    let record = newsroom_common::types::InteractionRecord {
        user_id,
        ts: Utc::now(),
        action: body.action,
        target: body.target,
        text: body.text,
        importance: body.importance,
        categories: body.categories,
    };
    state.memory.record(record).await.map_err(|e| ApiError(e.to_newsroom()))?;
    Ok(ok(()))
}

/// `DELETE /user/{id}/memory` (§6): wipes interactions and resets the
/// derived profile.
pub async fn delete_memory(State(state): State<Arc<AppState>>, Path(user_id): Path<String>) -> ApiResult<Json<SuccessBody<()>>> {
    state.memory.clear(&user_id).await.map_err(|e| ApiError(e.to_newsroom()))?;
    Ok(ok(()))
}

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use newsroom_common::NewsroomError;
use serde::{Deserialize, Serialize};

use newsroom_dialogue::{ChatRequest, ChatResponse};

use crate::error::{ok, ApiError, ApiResult, SuccessBody};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatBody {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub max_context_news: Option<u32>,
    #[serde(default = "default_true")]
    pub use_memory: bool,
    #[serde(default = "default_true")]
    pub personalize: bool,
    #[serde(default)]
    pub queue_if_busy: bool,
}

fn default_true() -> bool {
    true
}

/// `POST /chat` (§6, §4.10): a single dialogue turn.
pub async fn chat(State(state): State<Arc<AppState>>, Json(body): Json<ChatBody>) -> ApiResult<Json<SuccessBody<ChatResponse>>> {
    let mut request = ChatRequest::new(body.user_id, body.message);
    request.session_id = body.session_id;
    if let Some(k) = body.max_context_news {
        request.max_context_news = k;
    }
    request.use_memory = body.use_memory;
    request.personalize = body.personalize;
    request.queue_if_busy = body.queue_if_busy;

    let response = state.dialogue.chat(request).await?;
    let warnings = response.warnings.clone();
    Ok(crate::error::ok_with_warnings(response, warnings))
}

#[derive(Deserialize)]
pub struct SessionQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub user_id: String,
    pub turns: Vec<newsroom_common::types::DialogueTurn>,
}

/// `GET /chat/{sessionId}` (§6): session messages, newest `limit` first.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Json<SuccessBody<SessionView>>> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .map_err(|e| ApiError(e.to_newsroom()))?
        .ok_or_else(|| ApiError(NewsroomError::NotFound { kind: "dialogue session", id: session_id.clone() }))?;

    let limit = query.limit.unwrap_or(session.turns.len());
    let turns: Vec<_> = session.turns.iter().rev().take(limit).cloned().collect();
    Ok(ok(SessionView { session_id: session.id, user_id: session.user_id, turns }))
}

/// `DELETE /chat/{sessionId}` (§6).
pub async fn delete_session(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> ApiResult<Json<SuccessBody<()>>> {
    let existing = state.sessions.get(&session_id).await.map_err(|e| ApiError(e.to_newsroom()))?;
    if existing.is_none() {
        return Err(ApiError(NewsroomError::NotFound { kind: "dialogue session", id: session_id }));
    }
    state.sessions.delete(&session_id).await.map_err(|e| ApiError(e.to_newsroom()))?;
    Ok(ok(()))
}

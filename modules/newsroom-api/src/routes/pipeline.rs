use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use newsroom_common::types::{PipelineConfig, PipelineRun};
use newsroom_common::NewsroomError;
use serde::Deserialize;

use newsroom_pipeline::PipelineRequest;

use crate::error::{ok, ApiError, ApiResult, SuccessBody};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProcessBody {
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub config: Option<PipelineConfig>,
    #[serde(default)]
    pub queue_if_busy: bool,
}

/// `POST /pipeline/process` (§6): full pipeline run, `PipelineRun` inline.
pub async fn process(State(state): State<Arc<AppState>>, Json(body): Json<ProcessBody>) -> ApiResult<Json<SuccessBody<PipelineRun>>> {
    let request = PipelineRequest { user_id: body.user_id, query: body.query, config: body.config.unwrap_or_default(), queue_if_busy: body.queue_if_busy };
    run_and_retain(&state, request).await
}

#[derive(Deserialize)]
pub struct QuickBody {
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub queue_if_busy: bool,
}

/// `POST /pipeline/quick` (§6): `{store, index, analyze, card, sentiment,
/// memoryUpdate}` all false except search + card.
pub async fn quick(State(state): State<Arc<AppState>>, Json(body): Json<QuickBody>) -> ApiResult<Json<SuccessBody<PipelineRun>>> {
    let request = PipelineRequest { user_id: body.user_id, query: body.query, config: PipelineConfig::quick(), queue_if_busy: body.queue_if_busy };
    run_and_retain(&state, request).await
}

async fn run_and_retain(state: &AppState, request: PipelineRequest) -> ApiResult<Json<SuccessBody<PipelineRun>>> {
    let run = state.orchestrator.run(request).await?;
    if let Err(e) = state.runs.save(&run).await {
        tracing::warn!(error = %e, run_id = %run.id, "failed to persist pipeline run for status lookups");
    }
    let warnings = run.warnings.clone();
    Ok(crate::error::ok_with_warnings(run, warnings))
}

/// `GET /pipeline/status/{runId}` (§6).
pub async fn status(State(state): State<Arc<AppState>>, Path(run_id): Path<String>) -> ApiResult<Json<SuccessBody<PipelineRun>>> {
    let run = state.runs.get(&run_id).await?.ok_or_else(|| ApiError(NewsroomError::NotFound { kind: "pipeline run", id: run_id }))?;
    Ok(ok(run))
}

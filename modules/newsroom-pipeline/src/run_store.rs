//! Retained `PipelineRun` lookups for `/pipeline/status/{runId}` (§6). One
//! row per run, TTL-evicted after `RETENTION_DAYS` (§6's "7 days default"),
//! mirroring `newsroom-dialogue::session_store`'s JSONB-blob-per-aggregate
//! shape.
use async_trait::async_trait;
use newsroom_common::types::PipelineRun;
use newsroom_common::{NewsroomError, NewsroomResult};
use sqlx::PgPool;

const RETENTION_DAYS: i64 = 7;

#[async_trait]
pub trait PipelineRunStore: Send + Sync {
    async fn save(&self, run: &PipelineRun) -> NewsroomResult<()>;
    async fn get(&self, run_id: &str) -> NewsroomResult<Option<PipelineRun>>;
}

pub struct PgPipelineRunStore {
    pool: PgPool,
}

impl PgPipelineRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRunStore for PgPipelineRunStore {
    async fn save(&self, run: &PipelineRun) -> NewsroomResult<()> {
        let payload = serde_json::to_value(run).map_err(|e| NewsroomError::Internal(e.to_string()))?;
        sqlx::query("INSERT INTO pipeline_runs (id, user_id, run) VALUES ($1, $2, $3) ON CONFLICT (id) DO UPDATE SET run = excluded.run")
            .bind(&run.id)
            .bind(&run.user_id)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| NewsroomError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, run_id: &str) -> NewsroomResult<Option<PipelineRun>> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "SELECT run FROM pipeline_runs WHERE id = $1 AND created_at > now() - ($2 || ' days')::interval",
        )
        .bind(run_id)
        .bind(RETENTION_DAYS)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NewsroomError::StoreUnavailable(e.to_string()))?;

        row.map(|(json,)| serde_json::from_value(json).map_err(|e| NewsroomError::Internal(e.to_string()))).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsroom_common::types::{AggregateCounts, PipelineConfig, RunStatus};

    fn sample_run() -> PipelineRun {
        PipelineRun {
            id: "r1".into(),
            user_id: "u1".into(),
            query: "q".into(),
            config: PipelineConfig::default(),
            stage_results: vec![],
            aggregate: AggregateCounts::default(),
            warnings: vec![],
            errors: vec![],
            status: RunStatus::Success,
            total_duration_ms: 0,
            seed_timestamp: chrono::Utc::now(),
            corpus_summary: None,
            cards: vec![],
        }
    }

    #[test]
    fn run_round_trips_through_json() {
        let run = sample_run();
        let json = serde_json::to_value(&run).unwrap();
        let back: PipelineRun = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, run.id);
        assert_eq!(back.status, run.status);
    }
}

//! Session persistence backing `C10` (§4.10). One row per session, the
//! turn list stored as JSONB — the same shape the `dialogue_sessions`
//! table carries, mirroring `newsroom_memory`'s row-per-aggregate approach
//! rather than a turn-per-row table, since a session is always read and
//! rewritten whole.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsroom_common::types::DialogueSession;
use sqlx::{FromRow, PgPool};

use crate::error::{DialogueError, DialogueResult};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> DialogueResult<Option<DialogueSession>>;
    async fn save(&self, session: &DialogueSession) -> DialogueResult<()>;
    async fn delete(&self, session_id: &str) -> DialogueResult<()>;
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    turns: serde_json::Value,
    seeding_run_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, session_id: &str) -> DialogueResult<Option<DialogueSession>> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT id, user_id, turns, seeding_run_id, created_at, updated_at FROM dialogue_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DialogueError::StoreUnavailable(e.to_string()))?;

        row.map(|r| {
            let turns = serde_json::from_value(r.turns).map_err(|e| DialogueError::StoreUnavailable(e.to_string()))?;
            Ok(DialogueSession { id: r.id, user_id: r.user_id, turns, seeding_run_id: r.seeding_run_id, created_at: r.created_at, updated_at: r.updated_at })
        })
        .transpose()
    }

    async fn save(&self, session: &DialogueSession) -> DialogueResult<()> {
        let turns_json = serde_json::to_value(&session.turns).map_err(|e| DialogueError::StoreUnavailable(e.to_string()))?;
        sqlx::query(
            "INSERT INTO dialogue_sessions (id, user_id, turns, seeding_run_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET turns = excluded.turns, updated_at = excluded.updated_at",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(turns_json)
        .bind(&session.seeding_run_id)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DialogueError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> DialogueResult<()> {
        sqlx::query("DELETE FROM dialogue_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DialogueError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsroom_common::types::{DialogueTurn, TurnRole};

    #[test]
    fn turn_list_round_trips_through_json() {
        let turn = DialogueTurn { role: TurnRole::User, content: "hi".into(), ts: Utc::now(), sources: vec![] };
        let json = serde_json::to_value(vec![turn]).unwrap();
        let back: Vec<DialogueTurn> = serde_json::from_value(json).unwrap();
        assert_eq!(back[0].content, "hi");
    }
}

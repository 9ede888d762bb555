use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use newsroom_common::types::{InteractionRecord, StylePreferences, UserCounters, UserProfile};
use pgvector::Vector;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use ai_client::{Cancellation, LlmClient};

use crate::decay::decay_factor;
use crate::error::{MemoryError, MemoryResult};

/// Gap-free read of newly-appended interactions since `seq_start`: a
/// concurrent in-flight insert below the high-water mark must not be skipped,
/// so reads stop at the first hole rather than racing past it.
async fn read_interactions_from(pool: &PgPool, user_id: &str, seq_start: i64) -> MemoryResult<Vec<(i64, InteractionRecord)>> {
    #[derive(FromRow)]
    struct Row {
        seq: i64,
        user_id: String,
        ts: DateTime<Utc>,
        action: String,
        target: String,
        text: Option<String>,
        importance: f32,
        categories: Vec<String>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        "SELECT seq, user_id, ts, action, target, text, importance, categories
         FROM interactions WHERE user_id = $1 AND seq >= $2 ORDER BY seq ASC",
    )
    .bind(user_id)
    .bind(seq_start)
    .fetch_all(pool)
    .await?;

    let mut result = Vec::with_capacity(rows.len());
    let mut expected = seq_start;
    for row in rows {
        if row.seq != expected {
            break;
        }
        expected = row.seq + 1;
        let action = match row.action.as_str() {
            "query" => newsroom_common::types::InteractionAction::Query,
            "view" => newsroom_common::types::InteractionAction::View,
            "like" => newsroom_common::types::InteractionAction::Like,
            "share" => newsroom_common::types::InteractionAction::Share,
            "dwell" => newsroom_common::types::InteractionAction::Dwell,
            _ => newsroom_common::types::InteractionAction::DialogueTurn,
        };
        result.push((
            row.seq,
            InteractionRecord {
                user_id: row.user_id,
                ts: row.ts,
                action,
                target: row.target,
                text: row.text,
                importance: row.importance,
                categories: row.categories,
            },
        ));
    }
    Ok(result)
}

fn action_tag(action: newsroom_common::types::InteractionAction) -> &'static str {
    use newsroom_common::types::InteractionAction::*;
    match action {
        Query => "query",
        View => "view",
        Like => "like",
        Share => "share",
        Dwell => "dwell",
        DialogueTurn => "dialogue-turn",
    }
}

#[derive(FromRow)]
struct ProfileRow {
    user_id: String,
    interest_vector: Vector,
    interest_weight_total: f64,
    category_weights: serde_json::Value,
    category_weight_total: f64,
    decay_reference_at: DateTime<Utc>,
    last_seq: i64,
    preferred_sources: Vec<String>,
    style: serde_json::Value,
    counters: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

struct Accumulator {
    interest_sum: Vec<f32>,
    interest_weight_total: f64,
    category_raw: HashMap<String, f64>,
    category_weight_total: f64,
    decay_reference_at: DateTime<Utc>,
    last_seq: i64,
    preferred_sources: HashSet<String>,
    counters: UserCounters,
    created_at: DateTime<Utc>,
}

impl Accumulator {
    fn fresh(embedding_dim: usize, now: DateTime<Utc>) -> Self {
        Self {
            interest_sum: vec![0.0; embedding_dim],
            interest_weight_total: 0.0,
            category_raw: HashMap::new(),
            category_weight_total: 0.0,
            decay_reference_at: now,
            last_seq: 0,
            preferred_sources: HashSet::new(),
            counters: UserCounters::default(),
            created_at: now,
        }
    }

    fn from_row(row: ProfileRow) -> MemoryResult<Self> {
        let category_raw: HashMap<String, f64> =
            serde_json::from_value(row.category_weights).map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;
        let counters: UserCounters = serde_json::from_value(row.counters).map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;
        Ok(Self {
            interest_sum: row.interest_vector.to_vec(),
            interest_weight_total: row.interest_weight_total,
            category_raw,
            category_weight_total: row.category_weight_total,
            decay_reference_at: row.decay_reference_at,
            last_seq: row.last_seq,
            preferred_sources: row.preferred_sources.into_iter().collect(),
            counters,
            created_at: row.created_at,
        })
    }

    /// Fold one interaction in, rescaling the running sums forward to the
    /// interaction's own timestamp. Multiplicative decay makes this exact
    /// regardless of how many times `update_derived` has previously run
    /// (§4.7: incremental update must equal a full rebuild).
    fn fold(&mut self, interaction: &InteractionRecord, embedding: &[f32], halflife_days: f64) {
        let elapsed = interaction.ts - self.decay_reference_at;
        let factor = if elapsed.num_milliseconds() >= 0 { decay_factor(elapsed, halflife_days) } else { 1.0 };
        let weight = interaction.action.weight() as f64 * interaction.importance.max(0.01) as f64;

        for (s, e) in self.interest_sum.iter_mut().zip(embedding.iter()) {
            *s = (*s as f64 * factor) as f32 + (weight as f32) * e;
        }
        self.interest_weight_total = self.interest_weight_total * factor + weight;

        // Every category's accumulated weight decays to the new reference
        // point, whether or not this interaction touched it.
        for v in self.category_raw.values_mut() {
            *v *= factor;
        }
        for category in &interaction.categories {
            *self.category_raw.entry(category.clone()).or_insert(0.0) += weight;
        }
        self.category_weight_total = self.category_weight_total * factor + weight;
        self.decay_reference_at = interaction.ts;
        self.last_seq += 1;

        match interaction.action {
            newsroom_common::types::InteractionAction::Query => self.counters.queries_issued += 1,
            newsroom_common::types::InteractionAction::View => self.counters.articles_viewed += 1,
            newsroom_common::types::InteractionAction::Like => self.counters.cards_liked += 1,
            _ => {}
        }
    }

    fn to_profile(&self, user_id: &str, style: StylePreferences, now: DateTime<Utc>) -> UserProfile {
        let interest_vector = if self.interest_weight_total > 0.0 {
            self.interest_sum.iter().map(|v| (*v as f64 / self.interest_weight_total) as f32).collect()
        } else {
            self.interest_sum.clone()
        };

        let max_raw = self.category_raw.values().cloned().fold(0.0_f64, f64::max);
        let category_weights: HashMap<String, f32> = if max_raw > 0.0 {
            self.category_raw.iter().map(|(k, v)| (k.clone(), (v / max_raw) as f32)).collect()
        } else {
            HashMap::new()
        };

        UserProfile {
            user_id: user_id.to_string(),
            interest_vector,
            category_weights,
            preferred_sources: self.preferred_sources.clone(),
            style,
            counters: self.counters.clone(),
            created_at: self.created_at,
            updated_at: now,
        }
    }
}

/// The `C7` contract (§4.7). Interaction text is embedded through the same
/// `C4` client used for articles, so interest vectors and article vectors
/// share a coordinate space.
#[async_trait]
pub trait UserMemoryStore: Send + Sync {
    async fn record(&self, interaction: InteractionRecord) -> MemoryResult<()>;
    async fn get_profile(&self, user_id: &str) -> MemoryResult<UserProfile>;
    async fn update_derived(&self, user_id: &str, cancel: &Cancellation) -> MemoryResult<UserProfile>;
    async fn clear(&self, user_id: &str) -> MemoryResult<()>;
    /// Overwrites the stored style preferences without touching the
    /// interaction-derived fields (§6 `PUT /user/{id}/profile`).
    async fn set_style(&self, user_id: &str, style: StylePreferences) -> MemoryResult<UserProfile>;
}

pub struct PgUserMemoryStore {
    pool: PgPool,
    llm: Arc<dyn LlmClient>,
    embedding_dim: usize,
    halflife_days: f64,
}

impl PgUserMemoryStore {
    pub fn new(pool: PgPool, llm: Arc<dyn LlmClient>, embedding_dim: usize, halflife_days: f64) -> Self {
        Self { pool, llm, embedding_dim, halflife_days }
    }

    async fn load_accumulator(&self, user_id: &str, now: DateTime<Utc>) -> MemoryResult<(Accumulator, StylePreferences)> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT user_id, interest_vector, interest_weight_total, category_weights, category_weight_total,
                    decay_reference_at, last_seq, preferred_sources, style, counters, created_at, updated_at
             FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let style: StylePreferences = serde_json::from_value(r.style.clone()).unwrap_or_default();
                Ok((Accumulator::from_row(r)?, style))
            }
            None => Ok((Accumulator::fresh(self.embedding_dim, now), StylePreferences::default())),
        }
    }

    async fn persist(&self, user_id: &str, acc: &Accumulator, style: &StylePreferences, now: DateTime<Utc>) -> MemoryResult<()> {
        let category_weights_json = serde_json::to_value(&acc.category_raw).map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;
        let counters_json = serde_json::to_value(&acc.counters).map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;
        let style_json = serde_json::to_value(style).map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;
        let preferred: Vec<String> = acc.preferred_sources.iter().cloned().collect();

        sqlx::query(
            "INSERT INTO user_profiles
                (user_id, interest_vector, interest_weight_total, category_weights, category_weight_total,
                 decay_reference_at, last_seq, preferred_sources, style, counters, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (user_id) DO UPDATE SET
                interest_vector = excluded.interest_vector,
                interest_weight_total = excluded.interest_weight_total,
                category_weights = excluded.category_weights,
                category_weight_total = excluded.category_weight_total,
                decay_reference_at = excluded.decay_reference_at,
                last_seq = excluded.last_seq,
                preferred_sources = excluded.preferred_sources,
                style = excluded.style,
                counters = excluded.counters,
                updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(Vector::from(acc.interest_sum.clone()))
        .bind(acc.interest_weight_total)
        .bind(category_weights_json)
        .bind(acc.category_weight_total)
        .bind(acc.decay_reference_at)
        .bind(acc.last_seq)
        .bind(preferred)
        .bind(style_json)
        .bind(counters_json)
        .bind(acc.created_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UserMemoryStore for PgUserMemoryStore {
    async fn record(&self, interaction: InteractionRecord) -> MemoryResult<()> {
        sqlx::query(
            "INSERT INTO interactions (user_id, ts, action, target, text, importance, categories)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&interaction.user_id)
        .bind(interaction.ts)
        .bind(action_tag(interaction.action))
        .bind(&interaction.target)
        .bind(&interaction.text)
        .bind(interaction.importance)
        .bind(&interaction.categories)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> MemoryResult<UserProfile> {
        let now = Utc::now();
        let (acc, style) = self.load_accumulator(user_id, now).await?;
        Ok(acc.to_profile(user_id, style, now))
    }

    async fn update_derived(&self, user_id: &str, cancel: &Cancellation) -> MemoryResult<UserProfile> {
        let now = Utc::now();
        let (mut acc, style) = self.load_accumulator(user_id, now).await?;

        let pending = read_interactions_from(&self.pool, user_id, acc.last_seq + 1).await?;
        if pending.is_empty() {
            return Ok(acc.to_profile(user_id, style, now));
        }

        let texts: Vec<String> = pending.iter().map(|(_, i)| i.text.clone().unwrap_or_default()).collect();
        let embeddings = if texts.iter().any(|t| !t.is_empty()) {
            self.llm.embed(&texts, cancel).await.map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?
        } else {
            vec![vec![0.0; self.embedding_dim]; texts.len()]
        };

        for ((_, interaction), embedding) in pending.iter().zip(embeddings.iter()) {
            acc.fold(interaction, embedding, self.halflife_days);
        }

        self.persist(user_id, &acc, &style, now).await?;
        debug!(%user_id, processed = pending.len(), "updated derived user memory");
        Ok(acc.to_profile(user_id, style, now))
    }

    async fn clear(&self, user_id: &str) -> MemoryResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM interactions WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM user_profiles WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_style(&self, user_id: &str, style: StylePreferences) -> MemoryResult<UserProfile> {
        let now = Utc::now();
        let (acc, _) = self.load_accumulator(user_id, now).await?;
        self.persist(user_id, &acc, &style, now).await?;
        Ok(acc.to_profile(user_id, style, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsroom_common::types::InteractionAction;

    fn interaction(ts: DateTime<Utc>, action: InteractionAction, categories: Vec<&str>) -> InteractionRecord {
        InteractionRecord {
            user_id: "u1".into(),
            ts,
            action,
            target: "fp".into(),
            text: Some("text".into()),
            importance: 1.0,
            categories: categories.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn incremental_folding_matches_full_rebuild() {
        let base = Utc::now();
        let interactions = vec![
            (interaction(base, InteractionAction::Query, vec!["politics"]), vec![1.0_f32, 0.0]),
            (interaction(base + Duration::days(1), InteractionAction::View, vec!["sports"]), vec![0.0, 1.0]),
            (interaction(base + Duration::days(3), InteractionAction::Like, vec!["politics"]), vec![1.0, 1.0]),
        ];

        // Full rebuild: fold all three interactions into a single fresh accumulator.
        let mut full = Accumulator::fresh(2, base);
        full.decay_reference_at = interactions[0].0.ts;
        for (interaction, embedding) in &interactions {
            full.fold(interaction, embedding, 14.0);
        }

        // Incremental: fold the first interaction, "persist", reload, fold the rest.
        let mut incremental = Accumulator::fresh(2, base);
        incremental.decay_reference_at = interactions[0].0.ts;
        incremental.fold(&interactions[0].0, &interactions[0].1, 14.0);
        // Simulate a later update_derived call picking up where it left off.
        incremental.fold(&interactions[1].0, &interactions[1].1, 14.0);
        incremental.fold(&interactions[2].0, &interactions[2].1, 14.0);

        for (a, b) in full.interest_sum.iter().zip(incremental.interest_sum.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        assert!((full.interest_weight_total - incremental.interest_weight_total).abs() < 1e-9);
        assert_eq!(full.category_raw.get("politics"), incremental.category_raw.get("politics"));
    }

    #[test]
    fn category_weights_normalize_top_category_to_one() {
        let base = Utc::now();
        let mut acc = Accumulator::fresh(2, base);
        acc.fold(&interaction(base, InteractionAction::Query, vec!["politics"]), &[1.0, 0.0], 14.0);
        acc.fold(&interaction(base, InteractionAction::View, vec!["sports"]), &[0.0, 1.0], 14.0);
        let profile = acc.to_profile("u1", StylePreferences::default(), base);
        let max = profile.category_weights.values().cloned().fold(0.0_f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
    }
}

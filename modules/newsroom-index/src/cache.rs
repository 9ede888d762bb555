//! Embedding cache keyed by `SHA-256(model_version + text)`: check the
//! cache, compute on miss, store the result.
use pgvector::Vector;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::error::IndexResult;

pub struct EmbeddingCache {
    pool: PgPool,
    model_version: String,
}

impl EmbeddingCache {
    pub fn new(pool: PgPool, model_version: impl Into<String>) -> Self {
        Self { pool, model_version: model_version.into() }
    }

    fn hash_key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model_version.as_bytes());
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn get(&self, text: &str) -> IndexResult<Option<Vec<f32>>> {
        let hash = self.hash_key(text);
        let cached: Option<(Vector,)> =
            sqlx::query_as("SELECT embedding FROM embedding_cache WHERE input_hash = $1").bind(&hash).fetch_optional(&self.pool).await?;
        Ok(cached.map(|(v,)| v.to_vec()))
    }

    pub async fn put(&self, text: &str, embedding: &[f32]) -> IndexResult<()> {
        let hash = self.hash_key(text);
        sqlx::query("INSERT INTO embedding_cache (input_hash, model_version, embedding) VALUES ($1, $2, $3) ON CONFLICT (input_hash) DO NOTHING")
            .bind(&hash)
            .bind(&self.model_version)
            .bind(Vector::from(embedding.to_vec()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

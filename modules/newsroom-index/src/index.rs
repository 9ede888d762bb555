use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsroom_common::types::{Article, Chunk};
use pgvector::Vector;
use sqlx::PgPool;

use ai_client::Cancellation;

use crate::chunker::chunk_article;
use crate::embedder::Embedder;
use crate::error::IndexResult;

#[derive(Debug, Clone, Default)]
pub struct IndexOutcome {
    pub chunks: u32,
    pub vectors: u32,
    pub partially_indexed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub categories: Vec<String>,
    pub sources: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    /// Scopes the query to a specific corpus (e.g. the articles a pipeline
    /// run seeded) rather than the whole index.
    pub fingerprints: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub fingerprint: String,
    pub ordinal: u32,
    pub text: String,
    pub score: f32,
    /// The chunk's own (already-normalized) embedding, handed back so
    /// callers can re-rank against a second vector (e.g. a user's interest
    /// vector) without a round trip per candidate.
    pub embedding: Vec<f32>,
}

/// The `C3` contract (§4.3): chunk, embed, and upsert; query by
/// pre-normalized vector with cosine scoring.
#[async_trait]
pub trait EmbeddingIndexer: Send + Sync {
    async fn index(&self, article: &Article, reembed: bool, cancel: &Cancellation) -> IndexResult<IndexOutcome>;

    async fn query_by_vector(&self, vector: &[f32], k: u32, filter: &VectorFilter) -> IndexResult<Vec<ScoredChunk>>;
}

pub struct PgVectorIndexer {
    pool: PgPool,
    embedder: Embedder,
}

impl PgVectorIndexer {
    pub fn new(pool: PgPool, embedder: Embedder) -> Self {
        Self { pool, embedder }
    }

    async fn replace_chunks(&self, fingerprint: &str, chunks: &[Chunk]) -> IndexResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE fingerprint = $1").bind(fingerprint).execute(&mut *tx).await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (fingerprint, ordinal, text, token_count, source, embedding)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&chunk.fingerprint)
            .bind(chunk.ordinal as i32)
            .bind(&chunk.text)
            .bind(chunk.token_count as i32)
            .bind(format!("{:?}", chunk.source).to_lowercase())
            .bind(Vector::from(chunk.embedding.clone()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EmbeddingIndexer for PgVectorIndexer {
    async fn index(&self, article: &Article, reembed: bool, cancel: &Cancellation) -> IndexResult<IndexOutcome> {
        let drafts = chunk_article(article);
        let draft_count = drafts.len() as u32;
        let outcome = self.embedder.embed_drafts(&article.fingerprint, drafts, reembed, cancel).await?;

        self.replace_chunks(&article.fingerprint, &outcome.chunks).await?;

        Ok(IndexOutcome { chunks: draft_count, vectors: outcome.chunks.len() as u32, partially_indexed: outcome.partially_indexed })
    }

    async fn query_by_vector(&self, vector: &[f32], k: u32, filter: &VectorFilter) -> IndexResult<Vec<ScoredChunk>> {
        let rows: Vec<(String, i32, String, f32, Vector)> = sqlx::query_as(
            r#"
            SELECT c.fingerprint, c.ordinal, c.text, 1 - (c.embedding <=> $1) AS score, c.embedding
            FROM chunks c
            JOIN articles a ON a.fingerprint = c.fingerprint
            WHERE ($2::text[] IS NULL OR a.categories && $2)
              AND ($3::text[] IS NULL OR a.source = ANY($3))
              AND ($4::timestamptz IS NULL OR a.published_at >= $4)
              AND ($5::text[] IS NULL OR a.fingerprint = ANY($5))
            ORDER BY c.embedding <=> $1
            LIMIT $6
            "#,
        )
        .bind(Vector::from(vector.to_vec()))
        .bind(if filter.categories.is_empty() { None } else { Some(&filter.categories) })
        .bind(if filter.sources.is_empty() { None } else { Some(&filter.sources) })
        .bind(filter.since)
        .bind(if filter.fingerprints.is_empty() { None } else { Some(&filter.fingerprints) })
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(fingerprint, ordinal, text, score, embedding)| ScoredChunk {
                fingerprint,
                ordinal: ordinal as u32,
                text,
                score,
                embedding: embedding.to_vec(),
            })
            .collect())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsroom_common::fingerprint;
use newsroom_common::types::{Article, RawArticle};
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::error::StoreResult;

#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    pub stored: u32,
    pub duplicates: u32,
    pub fingerprints: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TagRangeFilter {
    pub tags: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: u32,
}

impl TagRangeFilter {
    pub fn new() -> Self {
        Self { limit: 100, ..Default::default() }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_range(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// The `C2` contract (§4.2). The store is the sole authority for article
/// identity: every other component treats `fingerprint` as opaque.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn upsert_many(&self, articles: Vec<RawArticle>, now: DateTime<Utc>) -> StoreResult<UpsertOutcome>;

    async fn get_by_fingerprints(&self, fingerprints: &[String]) -> StoreResult<Vec<Article>>;

    async fn query_by_tags_and_range(&self, filter: &TagRangeFilter) -> StoreResult<Vec<Article>>;
}

#[derive(FromRow)]
struct ArticleRow {
    fingerprint: String,
    title: String,
    summary: String,
    full_text: Option<String>,
    url: String,
    source: String,
    author: Option<String>,
    published_at: DateTime<Utc>,
    language: Option<String>,
    categories: Vec<String>,
    keywords: Vec<String>,
    query: String,
    discovered_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    partially_indexed: bool,
}

impl From<ArticleRow> for Article {
    fn from(r: ArticleRow) -> Self {
        Article {
            fingerprint: r.fingerprint,
            title: r.title,
            summary: r.summary,
            full_text: r.full_text,
            url: r.url,
            source: r.source,
            author: r.author,
            published_at: r.published_at,
            language: r.language,
            categories: r.categories,
            keywords: r.keywords,
            query: r.query,
            discovered_at: r.discovered_at,
            last_seen_at: r.last_seen_at,
            partially_indexed: r.partially_indexed,
        }
    }
}

pub struct PgArticleStore {
    pool: PgPool,
}

impl PgArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleStore for PgArticleStore {
    async fn upsert_many(&self, articles: Vec<RawArticle>, now: DateTime<Utc>) -> StoreResult<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        if articles.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.pool.begin().await?;

        for raw in articles {
            let fp = fingerprint::compute(&raw);
            let article = Article::from_raw(raw, fp.clone(), now);

            // `xmax = 0` is true only for the row just inserted by this
            // statement, distinguishing a fresh insert from a conflict update.
            let inserted: (bool,) = sqlx::query_as(
                r#"
                INSERT INTO articles
                    (fingerprint, title, summary, full_text, url, source, author,
                     published_at, language, categories, keywords, query,
                     discovered_at, last_seen_at, partially_indexed)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (fingerprint) DO UPDATE SET
                    categories = (SELECT array_agg(DISTINCT tag) FROM unnest(articles.categories || excluded.categories) AS tag),
                    keywords = (SELECT array_agg(DISTINCT kw) FROM unnest(articles.keywords || excluded.keywords) AS kw),
                    last_seen_at = excluded.last_seen_at
                RETURNING (xmax = 0) AS inserted
                "#,
            )
            .bind(&article.fingerprint)
            .bind(&article.title)
            .bind(&article.summary)
            .bind(&article.full_text)
            .bind(&article.url)
            .bind(&article.source)
            .bind(&article.author)
            .bind(article.published_at)
            .bind(&article.language)
            .bind(&article.categories)
            .bind(&article.keywords)
            .bind(&article.query)
            .bind(article.discovered_at)
            .bind(article.last_seen_at)
            .bind(article.partially_indexed)
            .fetch_one(&mut *tx)
            .await?;

            if inserted.0 {
                outcome.stored += 1;
            } else {
                outcome.duplicates += 1;
            }
            outcome.fingerprints.push(fp);
        }

        tx.commit().await?;
        debug!(stored = outcome.stored, duplicates = outcome.duplicates, "upserted article batch");
        Ok(outcome)
    }

    async fn get_by_fingerprints(&self, fingerprints: &[String]) -> StoreResult<Vec<Article>> {
        if fingerprints.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<ArticleRow> = sqlx::query_as("SELECT * FROM articles WHERE fingerprint = ANY($1)")
            .bind(fingerprints)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Article::from).collect())
    }

    async fn query_by_tags_and_range(&self, filter: &TagRangeFilter) -> StoreResult<Vec<Article>> {
        let rows: Vec<ArticleRow> = sqlx::query_as(
            r#"
            SELECT * FROM articles
            WHERE ($1::text[] IS NULL OR categories && $1)
              AND ($2::timestamptz IS NULL OR published_at >= $2)
              AND ($3::timestamptz IS NULL OR published_at <= $3)
            ORDER BY published_at DESC
            LIMIT $4
            "#,
        )
        .bind(if filter.tags.is_empty() { None } else { Some(&filter.tags) })
        .bind(filter.since)
        .bind(filter.until)
        .bind(filter.limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Article::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_builder_sets_limit_default() {
        let filter = TagRangeFilter::new();
        assert_eq!(filter.limit, 100);
        assert!(filter.tags.is_empty());
    }
}

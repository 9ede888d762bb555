//! The `C9` contract (§4.9): `retrieve(queryText, {user, k, filter}) -> [RetrievedChunk]`.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsroom_common::scoring::recency_decay;
use newsroom_common::similarity::cosine_similarity;
use newsroom_common::types::{Article, UserProfile};

use ai_client::{Cancellation, LlmClient};
use newsroom_index::{EmbeddingIndexer, ScoredChunk, VectorFilter};
use newsroom_store::{ArticleStore, TagRangeFilter};

use crate::error::{DialogueError, DialogueResult};

const WEIGHT_COSINE: f32 = 0.6;
const WEIGHT_RECENCY: f32 = 0.25;
const WEIGHT_PERSONALIZATION: f32 = 0.15;
const OVERSAMPLE_FACTOR: u32 = 3;
const DEFAULT_SIMILARITY_FLOOR: f32 = 0.2;

#[derive(Debug, Clone, Default)]
pub struct RetrievalFilter {
    pub categories: Vec<String>,
    pub sources: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    /// Scopes retrieval to a single pipeline run's corpus, the common case
    /// for a dialogue session seeded from a pipeline result.
    pub seeding_fingerprints: Vec<String>,
}

impl RetrievalFilter {
    /// §4.9 step 3: a filter this open is "broad" and qualifies for the
    /// keyword interleave pass over the article store.
    fn is_broad(&self) -> bool {
        self.seeding_fingerprints.is_empty() && self.categories.is_empty() && self.sources.is_empty()
    }

    fn to_vector_filter(&self) -> VectorFilter {
        VectorFilter {
            categories: self.categories.clone(),
            sources: self.sources.clone(),
            since: self.since,
            fingerprints: self.seeding_fingerprints.clone(),
        }
    }
}

pub struct RetrievalOptions<'a> {
    pub k: u32,
    pub similarity_floor: f32,
    pub user_profile: Option<&'a UserProfile>,
    pub now: DateTime<Utc>,
}

impl<'a> RetrievalOptions<'a> {
    pub fn new(k: u32) -> Self {
        Self { k, similarity_floor: DEFAULT_SIMILARITY_FLOOR, user_profile: None, now: Utc::now() }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub fingerprint: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
    /// Set when fewer than 2 results clear the similarity floor (§4.9).
    pub low_recall: bool,
}

#[async_trait]
pub trait RetrievalEngine: Send + Sync {
    async fn retrieve(
        &self,
        query_text: &str,
        filter: RetrievalFilter,
        options: RetrievalOptions<'_>,
        cancel: &Cancellation,
    ) -> DialogueResult<RetrievalResult>;
}

/// Vector search over `C3`'s index, optionally unioned with a keyword pass
/// over the article store, re-ranked by the §4.9 blended score.
pub struct HybridRetrievalEngine {
    indexer: Arc<dyn EmbeddingIndexer>,
    store: Arc<dyn ArticleStore>,
    llm: Arc<dyn LlmClient>,
}

impl HybridRetrievalEngine {
    pub fn new(indexer: Arc<dyn EmbeddingIndexer>, store: Arc<dyn ArticleStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self { indexer, store, llm }
    }

    /// No full-text search index exists in the corpus to ground a real
    /// BM25 pass on, so the keyword interleave scores articles by the
    /// fraction of query words present in their title/summary (§4.9 Open
    /// Question, see `DESIGN.md`).
    async fn keyword_candidates(&self, query_text: &str, filter: &RetrievalFilter, limit: u32) -> DialogueResult<Vec<(Article, f32)>> {
        let query_words: Vec<String> = query_text.split_whitespace().map(|w| w.to_lowercase()).collect();
        if query_words.is_empty() {
            return Ok(Vec::new());
        }

        let store_filter = TagRangeFilter::new().with_range(filter.since, None).with_limit(limit);
        let articles = self.store.query_by_tags_and_range(&store_filter).await.map_err(|e| DialogueError::StoreUnavailable(e.to_string()))?;

        Ok(articles
            .into_iter()
            .filter_map(|article| {
                let haystack = format!("{} {}", article.title, article.summary).to_lowercase();
                let hits = query_words.iter().filter(|w| haystack.contains(w.as_str())).count();
                if hits == 0 {
                    return None;
                }
                let overlap = hits as f32 / query_words.len() as f32;
                Some((article, overlap))
            })
            .collect())
    }
}

#[async_trait]
impl RetrievalEngine for HybridRetrievalEngine {
    async fn retrieve(
        &self,
        query_text: &str,
        filter: RetrievalFilter,
        options: RetrievalOptions<'_>,
        cancel: &Cancellation,
    ) -> DialogueResult<RetrievalResult> {
        let query_embedding = self
            .llm
            .embed(&[query_text.to_string()], cancel)
            .await
            .map_err(|e| DialogueError::EmbeddingFailed(e.to_string()))?
            .into_iter()
            .next()
            .unwrap_or_default();

        let oversample = (options.k * OVERSAMPLE_FACTOR).max(options.k);
        let vector_hits = self
            .indexer
            .query_by_vector(&query_embedding, oversample, &filter.to_vector_filter())
            .await
            .map_err(|e| DialogueError::IndexUnavailable(e.to_string()))?;

        let mut fingerprints: Vec<String> = vector_hits.iter().map(|c| c.fingerprint.clone()).collect();
        let broad = filter.is_broad();
        let keyword_hits = if broad { self.keyword_candidates(query_text, &filter, oversample).await? } else { Vec::new() };
        for (article, _) in &keyword_hits {
            if !fingerprints.contains(&article.fingerprint) {
                fingerprints.push(article.fingerprint.clone());
            }
        }

        let articles = self.store.get_by_fingerprints(&fingerprints).await.map_err(|e| DialogueError::StoreUnavailable(e.to_string()))?;
        let articles_by_fp: HashMap<String, Article> = articles.into_iter().map(|a| (a.fingerprint.clone(), a)).collect();

        // Collapse to one candidate chunk per article, keeping the
        // best-scoring vector hit and folding in the keyword overlap as an
        // additive floor so keyword-only matches still surface (§4.9 step 5).
        let mut best_per_article: HashMap<String, ScoredChunk> = HashMap::new();
        for chunk in vector_hits {
            best_per_article
                .entry(chunk.fingerprint.clone())
                .and_modify(|existing| {
                    if chunk.score > existing.score {
                        *existing = chunk.clone();
                    }
                })
                .or_insert(chunk);
        }
        let keyword_overlap: HashMap<String, f32> = keyword_hits.into_iter().map(|(a, overlap)| (a.fingerprint, overlap)).collect();
        for (fingerprint, overlap) in &keyword_overlap {
            best_per_article.entry(fingerprint.clone()).or_insert_with(|| ScoredChunk {
                fingerprint: fingerprint.clone(),
                ordinal: 0,
                text: articles_by_fp.get(fingerprint).map(|a| a.summary.clone()).unwrap_or_default(),
                score: *overlap,
                embedding: Vec::new(),
            });
        }

        let personalization_level = options.user_profile.map(|p| p.style.personalization_level).unwrap_or(0.0);
        let interest_vector = options.user_profile.map(|p| p.interest_vector.as_slice());

        let mut ranked: Vec<RetrievedChunk> = Vec::with_capacity(best_per_article.len());
        for (fingerprint, chunk) in best_per_article {
            let Some(article) = articles_by_fp.get(&fingerprint) else { continue };
            let cosine = chunk.score.max(keyword_overlap.get(&fingerprint).copied().unwrap_or(0.0));
            let recency = recency_decay(article.published_at, options.now);
            let personalization = match interest_vector {
                Some(v) if !chunk.embedding.is_empty() => cosine_similarity(&chunk.embedding, v),
                _ => 0.0,
            };
            let score = WEIGHT_COSINE * cosine + WEIGHT_RECENCY * recency + WEIGHT_PERSONALIZATION * personalization_level * personalization;

            if score < options.similarity_floor {
                continue;
            }
            ranked.push(RetrievedChunk {
                fingerprint: fingerprint.clone(),
                url: article.url.clone(),
                source: article.source.clone(),
                published_at: article.published_at,
                text: chunk.text,
                score,
            });
        }

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.fingerprint.cmp(&b.fingerprint)));
        ranked.truncate(options.k as usize);

        let low_recall = ranked.len() < 2;
        Ok(RetrievalResult { chunks: ranked, low_recall })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broad_filter_has_no_scoping_fields() {
        let filter = RetrievalFilter::default();
        assert!(filter.is_broad());
    }

    #[test]
    fn seeding_run_filter_is_not_broad() {
        let filter = RetrievalFilter { seeding_fingerprints: vec!["fp1".into()], ..Default::default() };
        assert!(!filter.is_broad());
    }
}

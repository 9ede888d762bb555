//! Calls the embedding provider in bounded batches and tolerates partial
//! batch failure (§4.3): a failed batch never fails the whole article, it
//! only marks it `partially-indexed`. Cache-backed via [`crate::cache::EmbeddingCache`].
use std::sync::Arc;

use ai_client::{Cancellation, LlmClient};
use newsroom_common::similarity::normalize;
use newsroom_common::types::Chunk;
use tracing::warn;

use crate::cache::EmbeddingCache;
use crate::chunker::ChunkDraft;
use crate::error::{IndexError, IndexResult};

const EMBED_BATCH_SIZE: usize = 32;

pub struct Embedder {
    llm: Arc<dyn LlmClient>,
    cache: Option<EmbeddingCache>,
}

pub struct EmbedOutcome {
    pub chunks: Vec<Chunk>,
    pub partially_indexed: bool,
}

impl Embedder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, cache: None }
    }

    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// `reembed = true` bypasses the cache and always calls the provider,
    /// overwriting any cached entries.
    pub async fn embed_drafts(
        &self,
        fingerprint: &str,
        drafts: Vec<ChunkDraft>,
        reembed: bool,
        cancel: &Cancellation,
    ) -> IndexResult<EmbedOutcome> {
        let total = drafts.len();
        let mut chunks = Vec::with_capacity(total);
        let mut any_batch_failed = false;
        let mut to_embed: Vec<ChunkDraft> = Vec::new();

        if let Some(cache) = &self.cache {
            if !reembed {
                for draft in drafts {
                    match cache.get(&draft.text).await? {
                        Some(vector) => chunks.push(Self::to_chunk(fingerprint, &draft, vector)),
                        None => to_embed.push(draft),
                    }
                }
            } else {
                to_embed = drafts;
            }
        } else {
            to_embed = drafts;
        }

        for batch in to_embed.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            match self.llm.embed(&texts, cancel).await {
                Ok(vectors) => {
                    for (draft, mut vector) in batch.iter().cloned().zip(vectors) {
                        normalize(&mut vector);
                        if let Some(cache) = &self.cache {
                            cache.put(&draft.text, &vector).await?;
                        }
                        chunks.push(Self::to_chunk(fingerprint, &draft, vector));
                    }
                }
                Err(e) => {
                    any_batch_failed = true;
                    warn!(%fingerprint, error = %e, "embedding batch failed, article will be partially indexed");
                }
            }
        }

        if total > 0 && chunks.is_empty() {
            return Err(IndexError::EmbeddingProviderFailed(format!("all embedding batches failed for {fingerprint}")));
        }

        chunks.sort_by_key(|c| c.ordinal);
        Ok(EmbedOutcome { chunks, partially_indexed: any_batch_failed })
    }

    fn to_chunk(fingerprint: &str, draft: &ChunkDraft, embedding: Vec<f32>) -> Chunk {
        Chunk {
            fingerprint: fingerprint.to_string(),
            ordinal: draft.ordinal,
            text: draft.text.clone(),
            token_count: draft.token_count,
            embedding,
            source: draft.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use newsroom_common::types::ChunkSource;

    struct AlwaysFailsAfterFirst {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl LlmClient for AlwaysFailsAfterFirst {
        async fn complete(
            &self,
            _request: ai_client::CompletionRequest,
            _cancel: &Cancellation,
        ) -> ai_client::AiClientResult<ai_client::CompletionResponse> {
            unimplemented!()
        }

        async fn complete_structured<T: ai_client::StructuredOutput>(
            &self,
            _request: ai_client::CompletionRequest,
            _cancel: &Cancellation,
        ) -> ai_client::AiClientResult<T>
        where
            Self: Sized,
        {
            unimplemented!()
        }

        async fn embed(&self, texts: &[String], _cancel: &Cancellation) -> ai_client::AiClientResult<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            } else {
                Err(ai_client::AiClientError::ProviderUnavailable("down".into()))
            }
        }
    }

    fn draft(ordinal: u32) -> ChunkDraft {
        ChunkDraft { ordinal, text: format!("chunk {ordinal}"), token_count: 2, source: ChunkSource::Body }
    }

    #[tokio::test]
    async fn partial_batch_failure_marks_partially_indexed_but_keeps_successes() {
        let drafts: Vec<_> = (0..40).map(draft).collect();
        let embedder = Embedder::new(Arc::new(AlwaysFailsAfterFirst { calls: Default::default() }));
        let outcome = embedder.embed_drafts("fp", drafts, false, &Cancellation::new()).await.unwrap();
        assert!(outcome.partially_indexed);
        assert_eq!(outcome.chunks.len(), 32);
    }
}

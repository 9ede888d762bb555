//! The `C8` contract (§4.8): composes C1-C7 as a staged job with toggles
//! and a partial-failure policy — a phased try/warn-on-failure run guarded
//! by a per-user lock so only one run is ever in flight per user.
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use newsroom_common::types::{
    AggregateCounts, Article, InteractionAction, InteractionRecord, PipelineConfig, PipelineRun, RunStatus, Stage, StageOutcome,
    StageResult,
};
use newsroom_common::{fingerprint, NewsroomError, NewsroomResult};
use tokio::time::{timeout, Instant};
use tracing::info;

use ai_client::{Cancellation, CompletionRequest, LlmClient, Message};
use newsroom_cards::{CardSynthesisOptions, CardSynthesizer, SentimentScorer};
use newsroom_index::EmbeddingIndexer;
use newsroom_memory::UserMemoryStore;
use newsroom_source::{NewsSearcher, SearchOptions};
use newsroom_store::ArticleStore;

use crate::concurrency::{ProviderSemaphores, UserLocks};
use crate::error::PipelineResult;

const SEARCH_TIMEOUT: StdDuration = StdDuration::from_secs(20);
const LLM_TIMEOUT: StdDuration = StdDuration::from_secs(60);
const STORE_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const DEFAULT_DEADLINE: StdDuration = StdDuration::from_secs(300);

/// Everything the orchestrator composes (§4.8's stage graph C1-C7). Each
/// dependency is a trait object: none of the methods the orchestrator calls
/// require the `Self: Sized` structured-output escape hatch, so object
/// safety is free here.
pub struct PipelineDeps {
    pub searcher: Arc<dyn NewsSearcher>,
    pub store: Arc<dyn ArticleStore>,
    pub indexer: Arc<dyn EmbeddingIndexer>,
    pub sentiment: Arc<dyn SentimentScorer>,
    pub cards: Arc<dyn CardSynthesizer>,
    pub memory: Arc<dyn UserMemoryStore>,
    pub llm: Arc<dyn LlmClient>,
    pub user_locks: UserLocks,
    pub semaphores: Arc<ProviderSemaphores>,
    pub deadline: StdDuration,
}

impl PipelineDeps {
    pub fn new(
        searcher: Arc<dyn NewsSearcher>,
        store: Arc<dyn ArticleStore>,
        indexer: Arc<dyn EmbeddingIndexer>,
        sentiment: Arc<dyn SentimentScorer>,
        cards: Arc<dyn CardSynthesizer>,
        memory: Arc<dyn UserMemoryStore>,
        llm: Arc<dyn LlmClient>,
        provider_concurrency: usize,
    ) -> Self {
        Self {
            searcher,
            store,
            indexer,
            sentiment,
            cards,
            memory,
            llm,
            user_locks: UserLocks::new(),
            semaphores: Arc::new(ProviderSemaphores::new(provider_concurrency, provider_concurrency, provider_concurrency)),
            deadline: DEFAULT_DEADLINE,
        }
    }
}

pub struct PipelineRequest {
    pub user_id: String,
    pub query: String,
    pub config: PipelineConfig,
    /// If the user already has a run in flight: wait for the slot (bounded
    /// queue depth 1, polled) rather than rejecting with `BusyRetry`.
    pub queue_if_busy: bool,
}

struct RunCtx {
    warnings: Vec<String>,
    errors: Vec<String>,
    stage_results: Vec<StageResult>,
}

impl RunCtx {
    fn new() -> Self {
        Self { warnings: Vec::new(), errors: Vec::new(), stage_results: Vec::new() }
    }

    fn record(&mut self, stage: Stage, outcome: StageOutcome, error_tag: Option<String>, started: Instant) {
        self.stage_results.push(StageResult { stage, outcome, error_tag, duration_ms: started.elapsed().as_millis() as u64 });
    }
}

pub struct PipelineOrchestrator {
    deps: Arc<PipelineDeps>,
}

impl PipelineOrchestrator {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self { deps }
    }

    pub async fn run(&self, request: PipelineRequest) -> PipelineResult<PipelineRun> {
        let PipelineRequest { user_id, query, config, queue_if_busy } = request;
        let config = config.clamp();
        let run_started = Instant::now();
        let seed_timestamp = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        let guard = self.acquire_user_slot(&user_id, queue_if_busy).await?;

        let cancel = Cancellation::new();
        let deadline_task = {
            let cancel = cancel.clone();
            let deadline = self.deps.deadline;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            })
        };

        let mut ctx = RunCtx::new();

        // C1 search — fatal on failure (§4.8).
        let stage_started = Instant::now();
        let raw_articles = match self.run_search(&query, config.num_results, &cancel).await {
            Ok(articles) => {
                ctx.record(Stage::Search, StageOutcome::Success, None, stage_started);
                articles
            }
            Err((outcome, message)) => {
                ctx.record(Stage::Search, outcome, Some(outcome_tag(&outcome)), stage_started);
                ctx.errors.push(message);
                deadline_task.abort();
                drop(guard);
                return Ok(finish_run(run_id, user_id, query, config, ctx, AggregateCounts::default(), None, Vec::new(), seed_timestamp, run_started, RunStatus::Failed));
            }
        };
        let found = raw_articles.len() as u32;

        // C2 store — failure downgrades to in-memory-only, non-fatal.
        let stage_started = Instant::now();
        let (articles, store_degraded) = self.run_store(&raw_articles, config.store, seed_timestamp, &mut ctx, stage_started).await;

        // C3 index, C5 sentiment, C4 corpus summary — parallel siblings (§4.8).
        let (index_outcome, sentiments, corpus_summary) = self
            .run_parallel_siblings(&articles, &config, store_degraded, &cancel, &mut ctx)
            .await;

        // C6 card synthesis.
        let stage_started = Instant::now();
        let cards = if config.card && !articles.is_empty() {
            let profile = self.deps.memory.get_profile(&user_id).await.ok();
            let options = CardSynthesisOptions { max_cards: config.max_cards, user_profile: profile.as_ref(), now: seed_timestamp };
            match self.deps.cards.synthesize(&articles, &sentiments, options, &cancel).await {
                Ok((cards, warnings)) => {
                    ctx.warnings.extend(warnings);
                    ctx.record(Stage::Card, StageOutcome::Success, None, stage_started);
                    cards
                }
                Err(e) => {
                    ctx.warnings.push(e.to_string());
                    ctx.record(Stage::Card, StageOutcome::Failed, Some(e.to_string()), stage_started);
                    Vec::new()
                }
            }
        } else {
            ctx.record(Stage::Card, StageOutcome::Skipped, None, stage_started);
            Vec::new()
        };

        // C7 memory update — records the query interaction, non-fatal.
        let stage_started = Instant::now();
        if config.memory_update {
            let categories = articles.iter().flat_map(|a| a.categories.clone()).collect::<Vec<_>>();
            let interaction = InteractionRecord {
                user_id: user_id.clone(),
                ts: seed_timestamp,
                action: InteractionAction::Query,
                target: run_id.clone(),
                text: Some(query.clone()),
                importance: 1.0,
                categories,
            };
            match self.deps.memory.record(interaction).await {
                Ok(()) => {
                    if let Err(e) = self.deps.memory.update_derived(&user_id, &cancel).await {
                        ctx.warnings.push(e.to_string());
                        ctx.record(Stage::MemoryUpdate, StageOutcome::Failed, Some(e.to_string()), stage_started);
                    } else {
                        ctx.record(Stage::MemoryUpdate, StageOutcome::Success, None, stage_started);
                    }
                }
                Err(e) => {
                    ctx.warnings.push(e.to_string());
                    ctx.record(Stage::MemoryUpdate, StageOutcome::Failed, Some(e.to_string()), stage_started);
                }
            }
        } else {
            ctx.record(Stage::MemoryUpdate, StageOutcome::Skipped, None, stage_started);
        }

        deadline_task.abort();
        drop(guard);

        let aggregate = AggregateCounts {
            found,
            stored: if config.store { articles.len() as u32 } else { 0 },
            indexed: index_outcome.vectors,
            cards_produced: cards.len() as u32,
        };

        let status = if cancel.is_cancelled() {
            RunStatus::PartialSuccess
        } else if ctx.stage_results.iter().any(|r| r.outcome == StageOutcome::Failed) {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        };

        Ok(finish_run(run_id, user_id, query, config, ctx, aggregate, corpus_summary, cards, seed_timestamp, run_started, status))
    }

    async fn acquire_user_slot(&self, user_id: &str, queue_if_busy: bool) -> NewsroomResult<crate::concurrency::UserSlotGuard> {
        let key = user_id.to_string();
        if let Some(guard) = self.deps.user_locks.try_acquire(&key).await {
            return Ok(guard);
        }
        if !queue_if_busy {
            return Err(NewsroomError::BusyRetry);
        }
        let deadline = Instant::now() + self.deps.deadline;
        loop {
            tokio::time::sleep(StdDuration::from_millis(100)).await;
            if let Some(guard) = self.deps.user_locks.try_acquire(&key).await {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(NewsroomError::BusyRetry);
            }
        }
    }

    async fn run_search(
        &self,
        query: &str,
        num_results: u32,
        cancel: &Cancellation,
    ) -> Result<Vec<newsroom_common::types::RawArticle>, (StageOutcome, String)> {
        let _permit = self
            .deps
            .semaphores
            .search
            .acquire()
            .await
            .map_err(|_| (StageOutcome::Failed, "search semaphore closed".to_string()))?;
        if cancel.is_cancelled() {
            return Err((StageOutcome::Cancelled, "search cancelled before dispatch".to_string()));
        }
        let options = SearchOptions::new(num_results);
        match timeout(SEARCH_TIMEOUT, self.deps.searcher.search(query, &options, cancel)).await {
            Ok(Ok(articles)) => Ok(articles),
            Ok(Err(e)) => Err((StageOutcome::Failed, e.to_string())),
            Err(_) => Err((StageOutcome::Cancelled, "search timed out".to_string())),
        }
    }

    /// Returns the article list to feed downstream stages and whether the
    /// run has downgraded to in-memory-only.
    async fn run_store(
        &self,
        raw_articles: &[newsroom_common::types::RawArticle],
        store_enabled: bool,
        now: chrono::DateTime<Utc>,
        ctx: &mut RunCtx,
        stage_started: Instant,
    ) -> (Vec<Article>, bool) {
        if !store_enabled {
            ctx.record(Stage::Store, StageOutcome::Skipped, None, stage_started);
            return (build_in_memory(raw_articles, now), true);
        }

        match timeout(STORE_TIMEOUT, self.deps.store.upsert_many(raw_articles.to_vec(), now)).await {
            Ok(Ok(outcome)) => match timeout(STORE_TIMEOUT, self.deps.store.get_by_fingerprints(&outcome.fingerprints)).await {
                Ok(Ok(articles)) => {
                    ctx.record(Stage::Store, StageOutcome::Success, None, stage_started);
                    (articles, false)
                }
                _ => {
                    ctx.warnings.push("article store read-back failed after upsert; continuing in-memory-only".into());
                    ctx.record(Stage::Store, StageOutcome::Failed, Some("read-back failed".into()), stage_started);
                    (build_in_memory(raw_articles, now), true)
                }
            },
            Ok(Err(e)) => {
                ctx.warnings.push(format!("article store unavailable, downgraded to in-memory-only: {e}"));
                ctx.record(Stage::Store, StageOutcome::Failed, Some(e.to_string()), stage_started);
                (build_in_memory(raw_articles, now), true)
            }
            Err(_) => {
                ctx.warnings.push("article store timed out, downgraded to in-memory-only".into());
                ctx.record(Stage::Store, StageOutcome::Cancelled, Some("timeout".into()), stage_started);
                (build_in_memory(raw_articles, now), true)
            }
        }
    }

    async fn run_parallel_siblings(
        &self,
        articles: &[Article],
        config: &PipelineConfig,
        store_degraded: bool,
        cancel: &Cancellation,
        ctx: &mut RunCtx,
    ) -> (newsroom_index::IndexOutcome, Vec<newsroom_cards::SentimentResult>, Option<String>) {
        let index_fut = self.run_index(articles, config.index && !store_degraded, cancel);
        let sentiment_fut = self.run_sentiment(articles, config.sentiment, cancel);
        let summary_fut = self.run_summary(articles, config.analyze, cancel);

        let (index_result, sentiment_result, summary_result) = tokio::join!(index_fut, sentiment_fut, summary_fut);

        let index_outcome = match index_result {
            Ok((outcome, stage_result)) => {
                if stage_result.outcome == StageOutcome::Failed {
                    ctx.warnings.push("embedding index stage failed".into());
                }
                ctx.stage_results.push(stage_result);
                outcome
            }
            Err(stage_result) => {
                ctx.warnings.push("embedding index stage failed".into());
                ctx.stage_results.push(stage_result);
                newsroom_index::IndexOutcome::default()
            }
        };

        let sentiments = match sentiment_result {
            Ok((sentiments, stage_result)) => {
                ctx.stage_results.push(stage_result);
                sentiments
            }
            Err(stage_result) => {
                ctx.warnings.push("sentiment scoring stage failed".into());
                ctx.stage_results.push(stage_result);
                neutral_sentiments(articles.len())
            }
        };

        let corpus_summary = match summary_result {
            Ok((summary, stage_result)) => {
                ctx.stage_results.push(stage_result);
                summary
            }
            Err(stage_result) => {
                ctx.warnings.push("corpus summary stage failed".into());
                ctx.stage_results.push(stage_result);
                None
            }
        };

        (index_outcome, sentiments, corpus_summary)
    }

    async fn run_index(
        &self,
        articles: &[Article],
        enabled: bool,
        cancel: &Cancellation,
    ) -> Result<(newsroom_index::IndexOutcome, StageResult), StageResult> {
        let started = Instant::now();
        if !enabled {
            return Ok((
                newsroom_index::IndexOutcome::default(),
                StageResult { stage: Stage::Index, outcome: StageOutcome::Skipped, error_tag: None, duration_ms: started.elapsed().as_millis() as u64 },
            ));
        }

        let mut total = newsroom_index::IndexOutcome::default();
        let mut last_error: Option<String> = None;
        for article in articles {
            if cancel.is_cancelled() {
                break;
            }
            match self.deps.indexer.index(article, false, cancel).await {
                Ok(outcome) => {
                    total.chunks += outcome.chunks;
                    total.vectors += outcome.vectors;
                    total.partially_indexed |= outcome.partially_indexed;
                }
                Err(e) => last_error = Some(e.to_newsroom().tag().to_string()),
            }
        }

        let outcome_kind = if cancel.is_cancelled() { StageOutcome::Cancelled } else if last_error.is_some() { StageOutcome::Failed } else { StageOutcome::Success };
        Ok((total, StageResult { stage: Stage::Index, outcome: outcome_kind, error_tag: last_error, duration_ms: started.elapsed().as_millis() as u64 }))
    }

    async fn run_sentiment(
        &self,
        articles: &[Article],
        enabled: bool,
        cancel: &Cancellation,
    ) -> Result<(Vec<newsroom_cards::SentimentResult>, StageResult), StageResult> {
        let started = Instant::now();
        if !enabled || articles.is_empty() {
            return Ok((
                neutral_sentiments(articles.len()),
                StageResult { stage: Stage::Sentiment, outcome: StageOutcome::Skipped, error_tag: None, duration_ms: started.elapsed().as_millis() as u64 },
            ));
        }

        let _permit = self.deps.semaphores.sentiment.acquire().await.ok();
        let texts: Vec<String> = articles.iter().map(|a| a.full_text.clone().unwrap_or_else(|| a.summary.clone())).collect();
        match self.deps.sentiment.score(&texts, cancel).await {
            Ok(sentiments) => Ok((
                sentiments,
                StageResult { stage: Stage::Sentiment, outcome: StageOutcome::Success, error_tag: None, duration_ms: started.elapsed().as_millis() as u64 },
            )),
            Err(e) => Err(StageResult { stage: Stage::Sentiment, outcome: StageOutcome::Failed, error_tag: Some(e.to_string()), duration_ms: started.elapsed().as_millis() as u64 }),
        }
    }

    async fn run_summary(&self, articles: &[Article], enabled: bool, cancel: &Cancellation) -> Result<(Option<String>, StageResult), StageResult> {
        let started = Instant::now();
        if !enabled || articles.is_empty() {
            return Ok((None, StageResult { stage: Stage::Summarize, outcome: StageOutcome::Skipped, error_tag: None, duration_ms: started.elapsed().as_millis() as u64 }));
        }

        let _permit = self.deps.semaphores.llm.acquire().await.ok();
        let digest = articles.iter().take(20).map(|a| format!("- {} ({})", a.title, a.source)).collect::<Vec<_>>().join("\n");
        let prompt = format!("Write a 3-5 sentence narrative summary of today's top news, given these headlines:\n{digest}");
        let request = CompletionRequest::new(vec![Message::user(prompt)]).with_temperature(0.5).with_max_tokens(400);

        match timeout(LLM_TIMEOUT, self.deps.llm.complete(request, cancel)).await {
            Ok(Ok(response)) => Ok((
                Some(response.text),
                StageResult { stage: Stage::Summarize, outcome: StageOutcome::Success, error_tag: None, duration_ms: started.elapsed().as_millis() as u64 },
            )),
            Ok(Err(e)) => Err(StageResult { stage: Stage::Summarize, outcome: StageOutcome::Failed, error_tag: Some(e.to_string()), duration_ms: started.elapsed().as_millis() as u64 }),
            Err(_) => Err(StageResult { stage: Stage::Summarize, outcome: StageOutcome::Cancelled, error_tag: Some("timeout".into()), duration_ms: started.elapsed().as_millis() as u64 }),
        }
    }
}

fn build_in_memory(raw_articles: &[newsroom_common::types::RawArticle], now: chrono::DateTime<Utc>) -> Vec<Article> {
    raw_articles
        .iter()
        .cloned()
        .map(|raw| {
            let fp = fingerprint::compute(&raw);
            Article::from_raw(raw, fp, now)
        })
        .collect()
}

fn neutral_sentiments(n: usize) -> Vec<newsroom_cards::SentimentResult> {
    (0..n)
        .map(|_| newsroom_cards::SentimentResult { label: newsroom_common::types::SentimentLabel::Neutral, magnitude: 0.0, confidence: 0.0 })
        .collect()
}

fn outcome_tag(outcome: &StageOutcome) -> String {
    format!("{outcome:?}")
}

#[allow(clippy::too_many_arguments)]
fn finish_run(
    run_id: String,
    user_id: String,
    query: String,
    config: PipelineConfig,
    ctx: RunCtx,
    aggregate: AggregateCounts,
    corpus_summary: Option<String>,
    cards: Vec<newsroom_common::types::NewsCard>,
    seed_timestamp: chrono::DateTime<Utc>,
    started: Instant,
    status: RunStatus,
) -> PipelineRun {
    info!(run_id = %run_id, user_id = %user_id, status = ?status, "pipeline run complete");
    PipelineRun {
        id: run_id,
        user_id,
        query,
        config,
        stage_results: ctx.stage_results,
        aggregate,
        warnings: ctx.warnings,
        errors: ctx.errors,
        status,
        total_duration_ms: started.elapsed().as_millis() as u64,
        seed_timestamp,
        corpus_summary,
        cards,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_tag_is_debug_formatted() {
        assert_eq!(outcome_tag(&StageOutcome::Failed), "Failed");
    }
}

mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use newsroom_cards::{LlmCardSynthesizer, LlmSentimentScorer};
use newsroom_common::{AppConfig, FileConfig};
use newsroom_dialogue::{DialogueDeps, DialogueManager, HybridRetrievalEngine, PgSessionStore};
use newsroom_index::{Embedder, PgVectorIndexer};
use newsroom_memory::PgUserMemoryStore;
use newsroom_pipeline::{PgPipelineRunStore, PipelineDeps, PipelineOrchestrator};
use newsroom_source::{HttpNewsSearcher, RateLimitedSearcher};
use newsroom_store::PgArticleStore;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).json().init();

    tracing::info!("starting newsroom-api");

    let config = AppConfig::from_env().context("loading AppConfig from environment")?;

    let config_path = std::env::var("NEWSROOM_CONFIG").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./newsroom.toml"));
    let file_config = Arc::new(FileConfig::load(&config_path).context("loading FileConfig")?);
    tracing::info!(config = %config_path.display(), "loaded file configuration");

    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(20).connect(&config.database_url).await.context("connecting to database")?;

    sqlx::migrate!("../../migrations").run(&pool).await.context("running migrations")?;
    tracing::info!("migrations complete");

    let http_client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build().context("building HTTP client")?;

    let openai = OpenAi::new(&config.openai_api_key, &config.completion_model).with_embedding_model(&config.embedding_model);
    let llm: Arc<dyn ai_client::LlmClient> = Arc::new(openai.clone());

    let searcher: Arc<dyn newsroom_source::NewsSearcher> = {
        let mut base = HttpNewsSearcher::new(http_client.clone(), config.search_api_key.clone());
        if let Some(base_url) = &config.search_base_url {
            base = base.with_base_url(base_url.clone());
        }
        Arc::new(RateLimitedSearcher::new(base, 5, 1.0))
    };

    let store: Arc<dyn newsroom_store::ArticleStore> = Arc::new(PgArticleStore::new(pool.clone()));

    let embedder = Embedder::new(llm.clone());
    let indexer: Arc<dyn newsroom_index::EmbeddingIndexer> = Arc::new(PgVectorIndexer::new(pool.clone(), embedder));

    let sentiment: Arc<dyn newsroom_cards::SentimentScorer> = Arc::new(LlmSentimentScorer::new(openai.clone()));
    let cards: Arc<dyn newsroom_cards::CardSynthesizer> = Arc::new(LlmCardSynthesizer::new(openai.clone()));

    let memory: Arc<dyn newsroom_memory::UserMemoryStore> = Arc::new(PgUserMemoryStore::new(pool.clone()));
    let sessions: Arc<dyn newsroom_dialogue::SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
    let runs: Arc<dyn newsroom_pipeline::PipelineRunStore> = Arc::new(PgPipelineRunStore::new(pool.clone()));

    let retrieval: Arc<dyn newsroom_dialogue::RetrievalEngine> = Arc::new(HybridRetrievalEngine::new(indexer.clone(), store.clone(), llm.clone()));

    let pipeline_deps = Arc::new(PipelineDeps::new(
        searcher,
        store.clone(),
        indexer,
        sentiment,
        cards,
        memory.clone(),
        llm.clone(),
        file_config.pipeline_concurrency,
    ));
    let orchestrator = PipelineOrchestrator::new(pipeline_deps.clone());

    let dialogue_deps = Arc::new(DialogueDeps::new(
        retrieval,
        sessions.clone(),
        memory.clone(),
        llm,
        pipeline_deps.semaphores.clone(),
        file_config.retrieval_similarity_floor,
    ));
    let dialogue = DialogueManager::new(dialogue_deps);

    let state = Arc::new(AppState { orchestrator, dialogue, memory, sessions, runs, config: Arc::new(config.clone()), file_config });

    let router = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("binding listener")?;
    tracing::info!(addr = %addr, "listening");
    axum::serve(listener, router).await.context("serving")?;

    Ok(())
}

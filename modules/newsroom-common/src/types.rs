use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Article (§3)
// =============================================================================

/// A news item as returned by the search adapter, before a fingerprint has
/// been assigned. Only the article store computes fingerprints (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    pub summary: String,
    pub full_text: Option<String>,
    pub url: String,
    pub source: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub language: Option<String>,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub query: String,
}

/// The normalized, identity-bearing unit of news (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub fingerprint: String,
    pub title: String,
    pub summary: String,
    pub full_text: Option<String>,
    pub url: String,
    pub source: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub language: Option<String>,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub query: String,
    pub discovered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Set by `C3` when an embedding batch partially fails (§4.3).
    pub partially_indexed: bool,
}

impl Article {
    /// Skew tolerance for the `published_at <= discovered_at + skew` invariant (§3).
    pub const PUBLISH_SKEW: chrono::Duration = chrono::Duration::minutes(10);

    pub fn from_raw(raw: RawArticle, fingerprint: String, discovered_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint,
            title: raw.title,
            summary: raw.summary,
            full_text: raw.full_text,
            url: raw.url,
            source: raw.source,
            author: raw.author,
            published_at: raw.published_at,
            language: raw.language,
            categories: raw.categories,
            keywords: raw.keywords,
            query: raw.query,
            discovered_at,
            last_seen_at: discovered_at,
            partially_indexed: false,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && self.published_at <= self.discovered_at + Self::PUBLISH_SKEW
    }
}

// =============================================================================
// Chunk (§3)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSource {
    Title,
    Summary,
    Body,
}

/// An embedding-addressable fragment of an article (§3). Identity is
/// `(fingerprint, ordinal)`; ordinals are 0-based and contiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub fingerprint: String,
    pub ordinal: u32,
    pub text: String,
    pub token_count: u32,
    pub embedding: Vec<f32>,
    pub source: ChunkSource,
}

// =============================================================================
// NewsCard (§3)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

/// The ranked, structured extract produced per pipeline run (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsCard {
    pub fingerprint: String,
    pub headline: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub sentiment_label: SentimentLabel,
    pub sentiment_magnitude: f32,
    pub confidence: f32,
    pub topic_tags: Vec<String>,
    pub source_credibility: f32,
    pub importance: f32,
    pub priority: u8,
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// UserProfile (§3)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylePreferences {
    pub response_length: ResponseLength,
    pub formality: f32,
    pub detail_depth: f32,
    pub personalization_level: f32,
}

impl Default for StylePreferences {
    fn default() -> Self {
        Self { response_length: ResponseLength::Medium, formality: 0.5, detail_depth: 0.5, personalization_level: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCounters {
    pub queries_issued: u64,
    pub articles_viewed: u64,
    pub cards_liked: u64,
}

/// A user's accumulated interest profile (§3, §4.7). The interaction log is
/// the source of truth; these fields are derived and may always be
/// recomputed from it (§8.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub interest_vector: Vec<f32>,
    pub category_weights: HashMap<String, f32>,
    pub preferred_sources: HashSet<String>,
    pub style: StylePreferences,
    pub counters: UserCounters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, embedding_dim: usize, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            interest_vector: vec![0.0; embedding_dim],
            category_weights: HashMap::new(),
            preferred_sources: HashSet::new(),
            style: StylePreferences::default(),
            counters: UserCounters::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// InteractionRecord (§3)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionAction {
    Query,
    View,
    Like,
    Share,
    Dwell,
    DialogueTurn,
}

impl InteractionAction {
    /// Action weight used in the interest-vector/category-weight running
    /// means (§4.7). Tunable defaults; see `DESIGN.md` Open Question.
    pub fn weight(self) -> f32 {
        match self {
            InteractionAction::Query => 1.0,
            InteractionAction::View => 0.3,
            InteractionAction::Like => 1.5,
            InteractionAction::Share => 1.2,
            InteractionAction::Dwell => 0.3,
            InteractionAction::DialogueTurn => 0.8,
        }
    }
}

/// An append-only fact about what a user did (§3). Ordered by timestamp per
/// user; never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: String,
    pub ts: DateTime<Utc>,
    pub action: InteractionAction,
    pub target: String,
    pub text: Option<String>,
    pub importance: f32,
    /// Category tags of the article this interaction concerns, if any;
    /// carried by the caller (pipeline or dialogue manager) since it already
    /// holds the article at record time (§4.7 category-weight derivation).
    pub categories: Vec<String>,
}

// =============================================================================
// DialogueSession (§3)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub role: TurnRole,
    pub content: String,
    pub ts: DateTime<Utc>,
    /// Article fingerprints cited as sources, populated on assistant turns.
    pub sources: Vec<String>,
}

/// A per-session, user-scoped conversation grounded in a pipeline run's
/// corpus (§3, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueSession {
    pub id: String,
    pub user_id: String,
    pub turns: Vec<DialogueTurn>,
    pub seeding_run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DialogueSession {
    /// Hard cap on stored turns before summarization kicks in (§4.10).
    pub const HISTORY_CAP: usize = 30;

    pub fn new(id: impl Into<String>, user_id: impl Into<String>, seeding_run_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self { id: id.into(), user_id: user_id.into(), turns: Vec::new(), seeding_run_id, created_at: now, updated_at: now }
    }

    pub fn user_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.role == TurnRole::User).count()
    }

    pub fn assistant_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.role == TurnRole::Assistant).count()
    }
}

// =============================================================================
// PipelineRun (§3, §4.8)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Search,
    Store,
    Index,
    Sentiment,
    Summarize,
    Card,
    MemoryUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageOutcome {
    Success,
    Skipped,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub error_tag: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AggregateCounts {
    pub found: u32,
    pub stored: u32,
    pub indexed: u32,
    pub cards_produced: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Failed,
}

/// Request flags for `C8::run` (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub num_results: u32,
    pub max_cards: u32,
    pub store: bool,
    pub index: bool,
    pub analyze: bool,
    pub card: bool,
    pub sentiment: bool,
    pub memory_update: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { num_results: 10, max_cards: 5, store: true, index: true, analyze: true, card: true, sentiment: true, memory_update: true }
    }
}

impl PipelineConfig {
    /// `/pipeline/quick` (§6): search + card only.
    pub fn quick() -> Self {
        Self { store: false, index: false, analyze: false, sentiment: false, memory_update: false, card: true, ..Self::default() }
    }

    pub fn clamp(mut self) -> Self {
        self.num_results = self.num_results.clamp(0, 100);
        self.max_cards = self.max_cards.clamp(0, 10);
        self
    }
}

/// One end-to-end invocation of the orchestrator over a single query (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub user_id: String,
    pub query: String,
    pub config: PipelineConfig,
    pub stage_results: Vec<StageResult>,
    pub aggregate: AggregateCounts,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub status: RunStatus,
    pub total_duration_ms: u64,
    pub seed_timestamp: DateTime<Utc>,
    /// Whole-corpus narrative produced by the sibling C4 summary stage, if enabled.
    pub corpus_summary: Option<String>,
    pub cards: Vec<NewsCard>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_config_clamps_to_spec_bounds() {
        let cfg = PipelineConfig { num_results: 500, max_cards: 99, ..Default::default() }.clamp();
        assert_eq!(cfg.num_results, 100);
        assert_eq!(cfg.max_cards, 10);
    }

    #[test]
    fn article_rejects_future_published_beyond_skew() {
        let now = Utc::now();
        let raw = RawArticle {
            title: "t".into(),
            summary: "s".into(),
            full_text: None,
            url: "https://example.com/a".into(),
            source: "example".into(),
            author: None,
            published_at: now + chrono::Duration::hours(1),
            language: None,
            categories: vec![],
            keywords: vec![],
            query: "q".into(),
        };
        let article = Article::from_raw(raw, "fp".into(), now);
        assert!(!article.is_well_formed());
    }

    #[test]
    fn dialogue_session_counts_roles_separately() {
        let mut session = DialogueSession::new("s1", "u1", None, Utc::now());
        session.turns.push(DialogueTurn { role: TurnRole::User, content: "hi".into(), ts: Utc::now(), sources: vec![] });
        session.turns.push(DialogueTurn { role: TurnRole::Assistant, content: "hello".into(), ts: Utc::now(), sources: vec![] });
        assert_eq!(session.user_turn_count(), 1);
        assert_eq!(session.assistant_turn_count(), 1);
    }
}

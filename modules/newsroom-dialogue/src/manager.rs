//! The `C10` contract (§4.10): `chat(user, sessionId?, message, opts) ->
//! {sessionId, reply, sources[], confidence, usage}`.
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use newsroom_common::concurrency::{KeyedLocks, ProviderSemaphores};
use newsroom_common::types::{DialogueSession, DialogueTurn, InteractionAction, InteractionRecord, TurnRole, UserProfile};
use newsroom_common::NewsroomError;
use tokio::time::{timeout, Instant};
use tracing::info;

use ai_client::{Cancellation, CompletionRequest, LlmClient, Message, Usage};
use newsroom_index::estimate_tokens;
use newsroom_memory::UserMemoryStore;

use crate::error::DialogueError;
use crate::retrieval::{RetrievalEngine, RetrievalFilter, RetrievalOptions, RetrievedChunk};
use crate::session_store::SessionStore;

const MODEL_CONTEXT_TOKENS: u32 = 128_000;
const HISTORY_TOKEN_FRACTION: f32 = 0.6;
const DEFAULT_MAX_CONTEXT_NEWS: u32 = 5;
const MAX_CONTEXT_NEWS_CAP: u32 = 10;
const SUMMARY_MAX_TOKENS: u32 = 300;
const GENERATION_TEMPERATURE: f32 = 0.7;
const GENERATION_MAX_TOKENS: u32 = 1200;
const TOP_CATEGORIES: usize = 3;
const DEFAULT_TURN_DEADLINE: StdDuration = StdDuration::from_secs(120);
const LLM_TIMEOUT: StdDuration = StdDuration::from_secs(60);

pub type ChatResult<T> = std::result::Result<T, NewsroomError>;

pub struct ChatRequest {
    pub user_id: String,
    pub session_id: Option<String>,
    pub message: String,
    pub max_context_news: u32,
    pub use_memory: bool,
    pub personalize: bool,
    /// Waits for a busy session's turn to free up (bounded, polled) instead
    /// of rejecting immediately with `SessionBusy`.
    pub queue_if_busy: bool,
}

impl ChatRequest {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            message: message.into(),
            max_context_news: DEFAULT_MAX_CONTEXT_NEWS,
            use_memory: true,
            personalize: true,
            queue_if_busy: false,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceRef {
    pub fingerprint: String,
    pub url: String,
    pub label: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
    pub usage: Usage,
    pub warnings: Vec<String>,
}

pub struct DialogueDeps {
    pub retrieval: Arc<dyn RetrievalEngine>,
    pub sessions: Arc<dyn SessionStore>,
    pub memory: Arc<dyn UserMemoryStore>,
    pub llm: Arc<dyn LlmClient>,
    pub session_locks: KeyedLocks<String>,
    pub semaphores: Arc<ProviderSemaphores>,
    pub similarity_floor: f32,
    pub turn_deadline: StdDuration,
}

impl DialogueDeps {
    pub fn new(
        retrieval: Arc<dyn RetrievalEngine>,
        sessions: Arc<dyn SessionStore>,
        memory: Arc<dyn UserMemoryStore>,
        llm: Arc<dyn LlmClient>,
        semaphores: Arc<ProviderSemaphores>,
        similarity_floor: f32,
    ) -> Self {
        Self {
            retrieval,
            sessions,
            memory,
            llm,
            session_locks: KeyedLocks::new(),
            semaphores,
            similarity_floor,
            turn_deadline: DEFAULT_TURN_DEADLINE,
        }
    }
}

const SYSTEM_PREAMBLE: &str = "You are a news briefing assistant. Answer using only the numbered sources \
provided below; cite them inline as [1], [2], etc. If the sources don't support a claim, say so instead \
of guessing. Format the reply as Markdown with headings, lists, and emphasis where it improves \
readability.";

pub struct DialogueManager {
    deps: Arc<DialogueDeps>,
}

impl DialogueManager {
    pub fn new(deps: Arc<DialogueDeps>) -> Self {
        Self { deps }
    }

    pub async fn chat(&self, request: ChatRequest) -> ChatResult<ChatResponse> {
        let ChatRequest { user_id, session_id, message, max_context_news, use_memory, personalize, queue_if_busy } = request;
        let max_context_news = max_context_news.clamp(1, MAX_CONTEXT_NEWS_CAP);
        let now = Utc::now();

        let mut session = self.resolve_session(&user_id, session_id.as_deref(), now).await?;
        let guard = self.acquire_session_slot(&session.id, queue_if_busy).await?;

        let cancel = Cancellation::new();
        let deadline_task = {
            let cancel = cancel.clone();
            let deadline = self.deps.turn_deadline;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            })
        };

        let result = self.run_turn(&mut session, &message, max_context_news, use_memory, personalize, now, &cancel).await;

        deadline_task.abort();
        drop(guard);
        result
    }

    async fn resolve_session(&self, user_id: &str, session_id: Option<&str>, now: chrono::DateTime<Utc>) -> ChatResult<DialogueSession> {
        match session_id {
            Some(id) => self
                .deps
                .sessions
                .get(id)
                .await
                .map_err(|e| e.to_newsroom())?
                .ok_or_else(|| NewsroomError::NotFound { kind: "dialogue session", id: id.to_string() }),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                let session = DialogueSession::new(id, user_id, None, now);
                self.deps.sessions.save(&session).await.map_err(|e| e.to_newsroom())?;
                Ok(session)
            }
        }
    }

    async fn acquire_session_slot(&self, session_id: &str, queue_if_busy: bool) -> ChatResult<newsroom_common::concurrency::KeyedLockGuard<String>> {
        let key = session_id.to_string();
        if let Some(guard) = self.deps.session_locks.try_acquire(&key).await {
            return Ok(guard);
        }
        if !queue_if_busy {
            return Err(NewsroomError::SessionBusy);
        }
        let deadline = Instant::now() + self.deps.turn_deadline;
        loop {
            tokio::time::sleep(StdDuration::from_millis(100)).await;
            if let Some(guard) = self.deps.session_locks.try_acquire(&key).await {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(NewsroomError::SessionBusy);
            }
        }
    }

    /// Cancellation partway through this does not record the turn (§4.10
    /// Failure semantics), so `session` is only persisted on the success
    /// path via `&mut` taken by value into `run_turn` and never written
    /// back by `chat` itself.
    async fn run_turn(
        &self,
        session: &mut DialogueSession,
        message: &str,
        max_context_news: u32,
        use_memory: bool,
        personalize: bool,
        now: chrono::DateTime<Utc>,
        cancel: &Cancellation,
    ) -> ChatResult<ChatResponse> {
        let mut warnings = Vec::new();

        let profile = if use_memory {
            match self.deps.memory.get_profile(&session.user_id).await {
                Ok(p) => Some(p),
                Err(e) => {
                    warnings.push(format!("memory unavailable, answering without personalization: {e}"));
                    None
                }
            }
        } else {
            None
        };

        // The session only records which pipeline run seeded it, not that
        // run's article fingerprints, so retrieval can't scope to the
        // seeding corpus here and instead searches the whole index (§4.9
        // Open Question, see `DESIGN.md`).
        let retrieval = self
            .deps
            .retrieval
            .retrieve(
                message,
                RetrievalFilter::default(),
                RetrievalOptions { k: max_context_news, similarity_floor: self.deps.similarity_floor, user_profile: profile.as_ref(), now },
                cancel,
            )
            .await;

        let retrieved = match retrieval {
            Ok(result) => {
                if result.low_recall {
                    warnings.push("LowRecall: fewer than 2 supporting sources cleared the similarity floor".to_string());
                }
                result.chunks
            }
            Err(e) => {
                warnings.push(format!("retrieval failed, answering without supporting context: {e}"));
                Vec::new()
            }
        };

        let history_budget = (MODEL_CONTEXT_TOKENS as f32 * HISTORY_TOKEN_FRACTION) as u32;
        if let Some(summary_note) = self.maybe_summarize_history(session, cancel).await {
            match summary_note {
                Ok(note) => session.turns = note,
                Err(e) => warnings.push(format!("history summarization failed, keeping full history: {e}")),
            }
        }
        let history = take_recent_turns_within_budget(&session.turns, history_budget);

        let system_message = compose_system_message(personalize, profile.as_ref(), &retrieved);
        let mut messages: Vec<Message> = history.iter().map(turn_to_message).collect();
        messages.push(Message::user(message.to_string()));

        let request = CompletionRequest::new(messages).with_system(system_message).with_temperature(GENERATION_TEMPERATURE).with_max_tokens(GENERATION_MAX_TOKENS);

        let _permit = self.deps.semaphores.llm.acquire().await.ok();
        let response = match timeout(LLM_TIMEOUT, self.deps.llm.complete(request, cancel)).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => return Err(DialogueError::GenerationFailed(e.to_string()).to_newsroom()),
            Err(_) => return Err(NewsroomError::DeadlineExceeded),
        };
        if cancel.is_cancelled() {
            return Err(NewsroomError::DeadlineExceeded);
        }

        let confidence = compute_confidence(&retrieved);
        let sources: Vec<SourceRef> = retrieved
            .iter()
            .map(|c| SourceRef { fingerprint: c.fingerprint.clone(), url: c.url.clone(), label: c.source.clone() })
            .collect();

        session.turns.push(DialogueTurn { role: TurnRole::User, content: message.to_string(), ts: now, sources: vec![] });
        session.turns.push(DialogueTurn {
            role: TurnRole::Assistant,
            content: response.text.clone(),
            ts: now,
            sources: sources.iter().map(|s| s.fingerprint.clone()).collect(),
        });
        session.updated_at = now;

        if let Err(e) = self.deps.sessions.save(session).await {
            warnings.push(format!("session persistence failed: {e}"));
        }

        let categories: Vec<String> = Vec::new();
        let interaction = InteractionRecord {
            user_id: session.user_id.clone(),
            ts: now,
            action: InteractionAction::DialogueTurn,
            target: session.id.clone(),
            text: Some(message.to_string()),
            importance: InteractionAction::DialogueTurn.weight(),
            categories,
        };
        if let Err(e) = self.deps.memory.record(interaction).await {
            warnings.push(format!("interaction recording failed: {e}"));
        }
        for source in &sources {
            let source_interaction = InteractionRecord {
                user_id: session.user_id.clone(),
                ts: now,
                action: InteractionAction::DialogueTurn,
                target: source.fingerprint.clone(),
                text: None,
                importance: InteractionAction::DialogueTurn.weight(),
                categories: Vec::new(),
            };
            if let Err(e) = self.deps.memory.record(source_interaction).await {
                warnings.push(format!("interaction recording failed: {e}"));
            }
        }

        info!(session_id = %session.id, user_id = %session.user_id, sources = sources.len(), "dialogue turn complete");

        Ok(ChatResponse { session_id: session.id.clone(), reply: response.text, sources, confidence, usage: response.usage, warnings })
    }

    /// When the turn history exceeds the hard cap, replace the oldest half
    /// with a single system note summarizing them in <= 300 tokens,
    /// preserving the unsummarized tail verbatim (§4.10 History pruning).
    async fn maybe_summarize_history(&self, session: &DialogueSession, cancel: &Cancellation) -> Option<Result<Vec<DialogueTurn>, NewsroomError>> {
        if session.turns.len() <= DialogueSession::HISTORY_CAP {
            return None;
        }
        let split = session.turns.len() / 2;
        let (to_summarize, tail) = session.turns.split_at(split);

        let transcript = to_summarize.iter().map(|t| format!("{:?}: {}", t.role, t.content)).collect::<Vec<_>>().join("\n");
        let prompt = format!("Summarize this conversation excerpt in under 300 tokens, preserving facts a later reply might need:\n\n{transcript}");
        let request = CompletionRequest::new(vec![Message::user(prompt)]).with_temperature(0.3).with_max_tokens(SUMMARY_MAX_TOKENS);

        let _permit = self.deps.semaphores.llm.acquire().await.ok();
        Some(match self.deps.llm.complete(request, cancel).await {
            Ok(response) => {
                let mut turns = vec![DialogueTurn { role: TurnRole::System, content: response.text, ts: Utc::now(), sources: vec![] }];
                turns.extend_from_slice(tail);
                Ok(turns)
            }
            Err(e) => Err(DialogueError::GenerationFailed(e.to_string()).to_newsroom()),
        })
    }
}

fn turn_to_message(turn: &DialogueTurn) -> Message {
    match turn.role {
        TurnRole::User => Message::user(turn.content.clone()),
        TurnRole::Assistant => Message::assistant(turn.content.clone()),
        TurnRole::System => Message::system(turn.content.clone()),
    }
}

fn take_recent_turns_within_budget(turns: &[DialogueTurn], budget_tokens: u32) -> Vec<DialogueTurn> {
    let mut taken = Vec::new();
    let mut used = 0u32;
    for turn in turns.iter().rev() {
        let cost = estimate_tokens(&turn.content);
        if used + cost > budget_tokens && !taken.is_empty() {
            break;
        }
        used += cost;
        taken.push(turn.clone());
    }
    taken.reverse();
    taken
}

/// Natural-language hints from the user's top categories and style,
/// weighted by personalization level (§4.10 step 3).
fn personalization_block(profile: &UserProfile) -> String {
    let mut ranked: Vec<(&String, &f32)> = profile.category_weights.iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
    let top: Vec<String> = ranked.into_iter().take(TOP_CATEGORIES).map(|(c, _)| c.clone()).collect();

    let mut lines = vec![format!("This reader's personalization level is {:.1} (0 = ignore, 1 = strongly apply).", profile.style.personalization_level)];
    if !top.is_empty() {
        lines.push(format!("They show the most interest in: {}.", top.join(", ")));
    }
    lines.push(match profile.style.response_length {
        newsroom_common::types::ResponseLength::Short => "Prefer short, direct replies.".to_string(),
        newsroom_common::types::ResponseLength::Medium => "Prefer a moderate level of detail.".to_string(),
        newsroom_common::types::ResponseLength::Long => "They're comfortable with longer, more thorough replies.".to_string(),
    });
    lines.join(" ")
}

fn context_block(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "No supporting sources were found for this query.".to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {} ({}, {})\n{}", i + 1, c.source, c.published_at.format("%Y-%m-%d"), c.url, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn compose_system_message(personalize: bool, profile: Option<&UserProfile>, chunks: &[RetrievedChunk]) -> String {
    let mut parts = vec![SYSTEM_PREAMBLE.to_string()];
    if personalize {
        if let Some(profile) = profile {
            parts.push(personalization_block(profile));
        }
    }
    parts.push(format!("Sources:\n{}", context_block(chunks)));
    parts.join("\n\n")
}

/// Mean cosine of retrieved chunks against the query, clamped to `[0, 1]`
/// (§4.10 step 5). Each `RetrievedChunk.score` is already the blended
/// re-rank score, which is itself bounded in `[0, 1]` since it's a convex
/// combination of bounded terms.
fn compute_confidence(chunks: &[RetrievedChunk]) -> f32 {
    if chunks.is_empty() {
        return 0.0;
    }
    let mean = chunks.iter().map(|c| c.score).sum::<f32>() / chunks.len() as f32;
    mean.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(role: TurnRole, content: &str) -> DialogueTurn {
        DialogueTurn { role, content: content.to_string(), ts: Utc::now(), sources: vec![] }
    }

    #[test]
    fn budget_keeps_only_the_most_recent_turns() {
        let turns: Vec<_> = (0..5).map(|i| turn(TurnRole::User, &format!("word{i} word{i} word{i}"))).collect();
        let kept = take_recent_turns_within_budget(&turns, 6);
        assert!(kept.len() < turns.len());
        assert_eq!(kept.last().unwrap().content, turns.last().unwrap().content);
    }

    #[test]
    fn budget_always_keeps_at_least_the_newest_turn() {
        let turns = vec![turn(TurnRole::User, &"word ".repeat(500))];
        let kept = take_recent_turns_within_budget(&turns, 1);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn confidence_is_zero_with_no_sources() {
        assert_eq!(compute_confidence(&[]), 0.0);
    }

    #[test]
    fn empty_context_block_says_so_explicitly() {
        assert!(context_block(&[]).contains("No supporting sources"));
    }
}

//! The `C6` contract (§4.6): `synthesize(articles, {maxCards, userProfile?}) -> [NewsCard]`.
use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsroom_common::scoring::recency_decay;
use newsroom_common::types::{Article, NewsCard, UserProfile};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::warn;

use ai_client::{Cancellation, CompletionRequest, LlmClient, Message};

use crate::error::{CardsError, CardsResult};
use crate::sentiment::SentimentResult;

const WEIGHT_RECENCY: f32 = 0.45;
const WEIGHT_CREDIBILITY: f32 = 0.25;
const WEIGHT_SENTIMENT: f32 = 0.20;
const WEIGHT_AFFINITY: f32 = 0.10;

/// No per-outlet reputation feed exists in the corpus to ground this on, so
/// credibility is a small static table of well-known wire services and
/// broadcasters, defaulting to a neutral 0.5 for anything unrecognized. See
/// `DESIGN.md` Open Question.
fn source_credibility(source: &str) -> f32 {
    const HIGH_CREDIBILITY: &[&str] =
        &["reuters", "associated press", "ap", "bbc", "bbc news", "npr", "the wall street journal", "bloomberg"];
    let lower = source.trim().to_lowercase();
    if HIGH_CREDIBILITY.iter().any(|s| lower == *s) {
        0.9
    } else {
        0.5
    }
}

/// Affinity between an article and a user's accumulated interests, derived
/// from category-weight overlap since per-article embeddings live in the
/// index, not here (§4.6 Open Question, see `DESIGN.md`).
fn profile_affinity(article: &Article, profile: Option<&UserProfile>) -> f32 {
    let Some(profile) = profile else { return 0.0 };
    if article.categories.is_empty() || profile.category_weights.is_empty() {
        return 0.0;
    }
    let weights: Vec<f32> = article.categories.iter().filter_map(|c| profile.category_weights.get(c).copied()).collect();
    if weights.is_empty() {
        0.0
    } else {
        (weights.iter().sum::<f32>() / weights.len() as f32).clamp(0.0, 1.0)
    }
}

fn importance(article: &Article, sentiment_magnitude: f32, profile: Option<&UserProfile>, now: DateTime<Utc>) -> f32 {
    WEIGHT_RECENCY * recency_decay(article.published_at, now)
        + WEIGHT_CREDIBILITY * source_credibility(&article.source)
        + WEIGHT_SENTIMENT * sentiment_magnitude
        + WEIGHT_AFFINITY * profile_affinity(article, profile)
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CardDraftWire {
    headline: String,
    summary: String,
    #[schemars(length(min = 3, max = 6))]
    key_points: Vec<String>,
    #[schemars(length(min = 1, max = 5))]
    topic_tags: Vec<String>,
}

pub struct CardSynthesisOptions<'a> {
    pub max_cards: u32,
    pub user_profile: Option<&'a UserProfile>,
    pub now: DateTime<Utc>,
}

/// `articles` and `sentiments` are aligned by index — sentiment scoring is
/// the sibling `C5` stage, run once upstream and handed in rather than
/// re-invoked here, so a pipeline run pays for one sentiment pass, not one
/// per consumer.
#[async_trait]
pub trait CardSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        articles: &[Article],
        sentiments: &[SentimentResult],
        options: CardSynthesisOptions<'_>,
        cancel: &Cancellation,
    ) -> CardsResult<(Vec<NewsCard>, Vec<String>)>;
}

pub struct LlmCardSynthesizer<L: LlmClient> {
    llm: L,
}

impl<L: LlmClient> LlmCardSynthesizer<L> {
    pub fn new(llm: L) -> Self {
        Self { llm }
    }

    async fn draft_one(&self, article: &Article, cancel: &Cancellation) -> CardsResult<CardDraftWire> {
        let body = article.full_text.as_deref().unwrap_or(&article.summary);
        let prompt = format!(
            "Produce a JSON object describing this news article for a reader digest.\n\
             Fields: headline (string), summary (2-4 sentences), keyPoints (3 to 6 bullet strings), \
             topicTags (1 to 5 short tag strings).\n\n\
             Title: {}\nSource: {}\nBody: {}",
            article.title, article.source, body
        );
        let request = CompletionRequest::new(vec![Message::user(prompt)]).with_temperature(0.3);
        self.llm.complete_structured(request, cancel).await.map_err(|e| CardsError::SynthesisProviderFailed(e.to_string()))
    }
}

/// Stable ordering: importance descending, then published-at descending,
/// then fingerprint ascending (§4.6 step 2, §8.6).
fn ranking_order(a: &(Article, f32, SentimentResult), b: &(Article, f32, SentimentResult)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.0.published_at.cmp(&a.0.published_at))
        .then_with(|| a.0.fingerprint.cmp(&b.0.fingerprint))
}

#[async_trait]
impl<L> CardSynthesizer for LlmCardSynthesizer<L>
where
    L: LlmClient + Sync,
{
    async fn synthesize(
        &self,
        articles: &[Article],
        sentiments: &[SentimentResult],
        options: CardSynthesisOptions<'_>,
        cancel: &Cancellation,
    ) -> CardsResult<(Vec<NewsCard>, Vec<String>)> {
        let mut warnings = Vec::new();
        if articles.is_empty() || options.max_cards == 0 {
            return Ok((Vec::new(), warnings));
        }

        let mut ranked: Vec<(Article, f32, SentimentResult)> = articles
            .iter()
            .cloned()
            .zip(sentiments.iter().copied())
            .map(|(article, sentiment)| {
                let score = importance(&article, sentiment.magnitude, options.user_profile, options.now);
                (article, score, sentiment)
            })
            .collect();

        ranked.sort_by(ranking_order);
        let take = (options.max_cards as usize).min(ranked.len());
        ranked.truncate(take);

        let total = ranked.len();
        let mut cards = Vec::with_capacity(total);
        let mut failures = 0usize;

        for (rank, (article, score, sentiment)) in ranked.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            match self.draft_one(&article, cancel).await {
                Ok(draft) => {
                    let rank_normalized = if total <= 1 { 0.0 } else { 1.0 - (rank as f32 / (total - 1) as f32) };
                    let priority = (1.0 + 9.0 * rank_normalized).floor().clamp(1.0, 10.0) as u8;
                    cards.push(NewsCard {
                        fingerprint: article.fingerprint.clone(),
                        headline: draft.headline,
                        summary: draft.summary,
                        key_points: draft.key_points,
                        sentiment_label: sentiment.label,
                        sentiment_magnitude: sentiment.magnitude,
                        confidence: sentiment.confidence,
                        topic_tags: draft.topic_tags,
                        source_credibility: source_credibility(&article.source),
                        importance: (score * 100.0).clamp(0.0, 100.0),
                        priority,
                        generated_at: options.now,
                    });
                }
                Err(err) => {
                    failures += 1;
                    warn!(fingerprint = %article.fingerprint, error = %err, "card generation failed for article");
                }
            }
        }

        if total > 0 && failures * 2 > total {
            warnings.push(CardsError::CardGenerationDegraded.to_string());
        }

        Ok((cards, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn article(fingerprint: &str, hours_ago: i64, source: &str) -> Article {
        let now = Utc::now();
        Article {
            fingerprint: fingerprint.into(),
            title: "t".into(),
            summary: "s".into(),
            full_text: None,
            url: "https://example.com".into(),
            source: source.into(),
            author: None,
            published_at: now - Duration::hours(hours_ago),
            language: None,
            categories: vec![],
            keywords: vec![],
            query: "q".into(),
            discovered_at: now,
            last_seen_at: now,
            partially_indexed: false,
        }
    }

    #[test]
    fn recency_decay_clamps_to_floor_for_old_articles() {
        let now = Utc::now();
        let decay = recency_decay(now - Duration::days(30), now);
        assert_eq!(decay, 0.05);
    }

    #[test]
    fn recency_decay_is_near_one_for_fresh_articles() {
        let now = Utc::now();
        let decay = recency_decay(now, now);
        assert!((decay - 1.0).abs() < 0.001);
    }

    #[test]
    fn known_wire_service_outranks_unknown_source() {
        assert!(source_credibility("Reuters") > source_credibility("some-blog"));
    }

    #[test]
    fn ranking_breaks_ties_by_published_at_then_fingerprint() {
        let sentiment = SentimentResult { label: newsroom_common::types::SentimentLabel::Neutral, magnitude: 0.0, confidence: 1.0 };
        let a = article("b", 1, "x");
        let b = article("a", 1, "x");
        let mut pairs = vec![(a, 0.5, sentiment), (b, 0.5, sentiment)];
        pairs.sort_by(ranking_order);
        assert_eq!(pairs[0].0.fingerprint, "a");
    }

    #[test]
    fn profile_affinity_is_zero_without_profile() {
        let a = article("a", 1, "x");
        assert_eq!(profile_affinity(&a, None), 0.0);
    }
}

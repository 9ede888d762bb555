//! The `C5` contract (§4.5): `score([text]) -> [{label, magnitude, confidence}]`.
use async_trait::async_trait;
use newsroom_common::types::SentimentLabel;
use schemars::JsonSchema;
use serde::Deserialize;

use ai_client::{Cancellation, CompletionRequest, LlmClient, Message};

use crate::error::{CardsError, CardsResult};

const MAX_CHARS: usize = 2000;
const HEAD_CHARS: usize = 1000;
const TAIL_CHARS: usize = 500;
const CONFIDENCE_FLOOR: f32 = 0.4;

#[derive(Debug, Clone, Copy)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub magnitude: f32,
    pub confidence: f32,
}

#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, texts: &[String], cancel: &Cancellation) -> CardsResult<Vec<SentimentResult>>;
}

/// Caps input at 2000 characters, keeping the first 1000 and last 500 when
/// longer, so one very long article doesn't dominate token spend.
fn cap_text(text: &str) -> String {
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    let head: String = chars[..HEAD_CHARS].iter().collect();
    let tail: String = chars[chars.len() - TAIL_CHARS..].iter().collect();
    format!("{head}\n...\n{tail}")
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SentimentItemWire {
    label: String,
    magnitude: f32,
    confidence: f32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SentimentBatchWire {
    results: Vec<SentimentItemWire>,
}

fn parse_label(s: &str) -> SentimentLabel {
    match s.to_lowercase().as_str() {
        "positive" => SentimentLabel::Positive,
        "negative" => SentimentLabel::Negative,
        _ => SentimentLabel::Neutral,
    }
}

pub struct LlmSentimentScorer<L: LlmClient> {
    llm: L,
}

impl<L: LlmClient> LlmSentimentScorer<L> {
    pub fn new(llm: L) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl<L: LlmClient + Sync> SentimentScorer for LlmSentimentScorer<L> {
    async fn score(&self, texts: &[String], cancel: &Cancellation) -> CardsResult<Vec<SentimentResult>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let capped: Vec<String> = texts.iter().map(|t| cap_text(t)).collect();
        let numbered = capped.iter().enumerate().map(|(i, t)| format!("[{i}] {t}")).collect::<Vec<_>>().join("\n\n");
        let prompt = format!(
            "Score the sentiment of each of the following {} numbered texts. \
             For each, return a label in {{positive, neutral, negative}}, a magnitude in [0,1] \
             measuring the strength of the dominant polarity, and a confidence in [0,1]. \
             Return results in the same order as the input.\n\n{numbered}",
            capped.len()
        );

        let request = CompletionRequest::new(vec![Message::user(prompt)]).with_temperature(0.0);
        let batch: SentimentBatchWire =
            self.llm.complete_structured(request, cancel).await.map_err(|e| CardsError::SentimentProviderFailed(e.to_string()))?;

        Ok(batch
            .results
            .into_iter()
            .map(|item| {
                let mut label = parse_label(&item.label);
                let confidence = item.confidence.clamp(0.0, 1.0);
                if confidence < CONFIDENCE_FLOOR {
                    label = SentimentLabel::Neutral;
                }
                SentimentResult { label, magnitude: item.magnitude.clamp(0.0, 1.0), confidence }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_text_keeps_head_and_tail_of_long_input() {
        let long = "a".repeat(3000);
        let capped = cap_text(&long);
        assert!(capped.len() < long.len());
        assert!(capped.starts_with('a'));
    }

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(cap_text("short"), "short");
    }

    #[test]
    fn low_confidence_collapses_to_neutral() {
        let low_conf_label = if 0.2_f32 < CONFIDENCE_FLOOR { SentimentLabel::Neutral } else { SentimentLabel::Positive };
        assert_eq!(low_conf_label, SentimentLabel::Neutral);
    }
}

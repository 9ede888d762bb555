use async_trait::async_trait;
use newsroom_common::types::RawArticle;

use ai_client::Cancellation;

use crate::error::SourceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Day,
    Week,
    Month,
    Year,
}

impl Window {
    /// Translate the relative lookback to the provider's vocabulary (§4.1).
    pub fn as_provider_str(self) -> &'static str {
        match self {
            Window::Day => "1d",
            Window::Week => "1w",
            Window::Month => "1m",
            Window::Year => "1y",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub num: u32,
    pub language: Option<String>,
    pub country: Option<String>,
    pub window: Window,
}

impl SearchOptions {
    pub fn new(num: u32) -> Self {
        Self { num, language: None, country: None, window: Window::Week }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }
}

/// The `C1` contract (§4.1): one outbound call per invocation, returning
/// between 0 and `options.num` items, deduplicated by URL within the
/// response. Implementations never compute fingerprints — that is `C2`'s job.
#[async_trait]
pub trait NewsSearcher: Send + Sync {
    async fn search(&self, query: &str, options: &SearchOptions, cancel: &Cancellation) -> SourceResult<Vec<RawArticle>>;

    fn name(&self) -> &str {
        "unknown"
    }
}

/// Drop duplicate URLs within a single response, keeping first occurrence.
pub fn dedup_by_url(mut articles: Vec<RawArticle>) -> Vec<RawArticle> {
    let mut seen = std::collections::HashSet::new();
    articles.retain(|a| seen.insert(a.url.clone()));
    articles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(url: &str) -> RawArticle {
        RawArticle {
            title: "t".into(),
            summary: "s".into(),
            full_text: None,
            url: url.into(),
            source: "src".into(),
            author: None,
            published_at: Utc::now(),
            language: None,
            categories: vec![],
            keywords: vec![],
            query: "q".into(),
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence_per_url() {
        let articles = vec![article("https://a.example/1"), article("https://a.example/1"), article("https://a.example/2")];
        let deduped = dedup_by_url(articles);
        assert_eq!(deduped.len(), 2);
    }
}

use async_trait::async_trait;
use newsroom_common::types::RawArticle;
use serde::Deserialize;
use tracing::warn;

use ai_client::Cancellation;

use crate::error::{SourceError, SourceResult};
use crate::searcher::{dedup_by_url, NewsSearcher, SearchOptions};

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    articles: Vec<ProviderArticle>,
}

#[derive(Debug, Deserialize)]
struct ProviderArticle {
    title: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: Option<String>,
    url: String,
    source: Option<ProviderSource>,
    author: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    category: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderSource {
    name: Option<String>,
}

/// A generic HTTP news-search provider. Single outbound call per `search`
/// (§4.1); retry and rate limiting are the concern of [`crate::RateLimitedSearcher`].
pub struct HttpNewsSearcher {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HttpNewsSearcher {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self { http, api_key: api_key.into(), base_url: "https://newsapi.example/v2".to_string() }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn to_raw_article(item: ProviderArticle, query: &str) -> Option<RawArticle> {
        let title = item.title?;
        if title.trim().is_empty() {
            return None;
        }
        Some(RawArticle {
            title,
            summary: item.description,
            full_text: item.content,
            url: item.url,
            source: item.source.and_then(|s| s.name).unwrap_or_else(|| "unknown".to_string()),
            author: item.author,
            published_at: item.published_at,
            language: None,
            categories: item.category,
            keywords: item.keywords,
            query: query.to_string(),
        })
    }
}

#[async_trait]
impl NewsSearcher for HttpNewsSearcher {
    async fn search(&self, query: &str, options: &SearchOptions, _cancel: &Cancellation) -> SourceResult<Vec<RawArticle>> {
        let mut request = self.http.get(format!("{}/everything", self.base_url)).query(&[
            ("q", query.to_string()),
            ("pageSize", options.num.to_string()),
            ("window", options.window.as_provider_str().to_string()),
        ]);
        if let Some(lang) = &options.language {
            request = request.query(&[("language", lang)]);
        }
        if let Some(country) = &options.country {
            request = request.query(&[("country", country)]);
        }
        request = request.header("X-Api-Key", &self.api_key);

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::ProviderUnavailable(format!("request timed out: {e}"))
            } else {
                SourceError::ProviderUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SourceError::ProviderRateLimited(format!("provider returned 429 for query {query:?}")));
        }
        if status.is_server_error() {
            return Err(SourceError::ProviderUnavailable(format!("provider returned {status}")));
        }
        if !status.is_success() {
            return Err(SourceError::InvalidResponse(format!("provider returned {status}")));
        }

        let body: ProviderResponse = response.json().await.map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        let articles: Vec<RawArticle> = body
            .articles
            .into_iter()
            .filter_map(|item| match Self::to_raw_article(item, query) {
                Some(a) => Some(a),
                None => {
                    warn!(%query, "dropping article with missing title");
                    None
                }
            })
            .take(options.num as usize)
            .collect();

        Ok(dedup_by_url(articles))
    }

    fn name(&self) -> &str {
        "http-news-search"
    }
}

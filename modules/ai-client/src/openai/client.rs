use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use super::types::*;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

pub(crate) struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str) -> Self {
        Self { api_key: api_key.to_string(), http: reqwest::Client::new(), base_url: OPENAI_API_URL.to_string() }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).expect("api key is a valid header value"),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, reqwest::Error> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, "openai chat request");
        self.http.post(&url).headers(self.headers()).json(request).send().await?.error_for_status()?.json().await
    }

    pub async fn structured_output(&self, request: &StructuredRequest) -> Result<ChatResponse, reqwest::Error> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, "openai structured output request");
        self.http.post(&url).headers(self.headers()).json(request).send().await?.error_for_status()?.json().await
    }

    pub async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, reqwest::Error> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest { model: model.to_string(), input: texts.to_vec() };
        let response: EmbeddingResponse =
            self.http.post(&url).headers(self.headers()).json(&request).send().await?.error_for_status()?.json().await?;
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

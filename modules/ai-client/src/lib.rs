//! Provider-agnostic LLM client (`C4` in the pipeline design).
//!
//! Owns no domain prompts — callers compose fully-formed messages and, when
//! structured output is required, supply a type implementing
//! [`StructuredOutput`]. The client validates the provider's response against
//! that type's JSON schema and retries once with a repair instruction before
//! giving up with [`AiClientError::UnstructuredOutput`].

mod cancel;
pub mod claude;
pub mod error;
pub mod openai;
mod retry;
mod structured;

pub use cancel::Cancellation;
pub use claude::Claude;
pub use error::{AiClientError, AiClientResult};
pub use openai::OpenAi;
pub use structured::StructuredOutput;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One message in a chat-style prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Token accounting returned alongside every completion, for usage tracking.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A `complete()` request. `system` and `messages` are fully composed by the
/// caller — the client does not know or care what domain it is serving.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { system: None, messages, temperature: 0.7, max_tokens: 1024 }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: Usage,
}

/// The `C4` contract: `complete` and `embed`, provider-agnostic.
///
/// Implementations retry once on a transient (5xx / timeout) failure with a
/// 1s backoff; further failures propagate as [`AiClientError::ProviderUnavailable`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &Cancellation,
    ) -> AiClientResult<CompletionResponse>;

    /// Structured-output completion: validates the response against `T`'s
    /// JSON schema, retrying once with a repair instruction on mismatch.
    ///
    /// `Self: Sized` keeps `LlmClient` object-safe for callers that need
    /// `Arc<dyn LlmClient>` — this method is simply unavailable through a
    /// trait object and must be called on a concrete client type.
    async fn complete_structured<T: StructuredOutput>(
        &self,
        request: CompletionRequest,
        cancel: &Cancellation,
    ) -> AiClientResult<T>
    where
        Self: Sized;

    async fn embed(&self, texts: &[String], cancel: &Cancellation) -> AiClientResult<Vec<Vec<f32>>>;
}

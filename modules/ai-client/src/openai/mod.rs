mod client;
pub(crate) mod types;

use async_trait::async_trait;
use tracing::warn;

use crate::cancel::Cancellation;
use crate::error::{AiClientError, AiClientResult};
use crate::retry::once_with_backoff;
use crate::structured::{repair_instruction, StructuredOutput};
use crate::{CompletionRequest, CompletionResponse, LlmClient, Message, Role, Usage};

use client::OpenAiClient;
use types::*;

/// OpenAI-backed [`LlmClient`]. Also the default embedding provider.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    embedding_model: String,
    base_url: Option<String>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: None,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, std::env::VarError> {
        let api_key = std::env::var("OPENAI_API_KEY")?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key);
        match &self.base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        }
    }

    fn to_wire(messages: &[Message], system: Option<&str>) -> Vec<WireMessage> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            wire.push(WireMessage::system(system));
        }
        for m in messages {
            wire.push(match m.role {
                Role::System => WireMessage::system(&m.content),
                Role::User => WireMessage::user(&m.content),
                Role::Assistant => WireMessage::assistant(&m.content),
            });
        }
        wire
    }
}

#[async_trait]
impl LlmClient for OpenAi {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &Cancellation,
    ) -> AiClientResult<CompletionResponse> {
        let wire = Self::to_wire(&request.messages, request.system.as_deref());
        let chat_request = ChatRequest {
            model: self.model.clone(),
            messages: wire,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = once_with_backoff(cancel, || self.client().chat(&chat_request)).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiClientError::ProviderUnavailable("empty choices in response".into()))?;

        Ok(CompletionResponse {
            text,
            usage: Usage { prompt_tokens: response.usage.prompt_tokens, completion_tokens: response.usage.completion_tokens },
        })
    }

    async fn complete_structured<T: StructuredOutput>(
        &self,
        mut request: CompletionRequest,
        cancel: &Cancellation,
    ) -> AiClientResult<T> {
        let schema = T::json_schema();
        let type_name = T::type_name();

        for attempt in 0..2 {
            let wire = Self::to_wire(&request.messages, request.system.as_deref());
            let structured_request = StructuredRequest {
                model: self.model.clone(),
                messages: wire,
                temperature: request.temperature,
                response_format: ResponseFormat {
                    format_type: "json_schema",
                    json_schema: JsonSchemaFormat { name: type_name.clone(), strict: true, schema: schema.clone() },
                },
            };

            let response = once_with_backoff(cancel, || self.client().structured_output(&structured_request)).await?;
            let raw = response
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();

            match serde_json::from_str::<T>(&raw) {
                Ok(value) => return Ok(value),
                Err(e) if attempt == 0 => {
                    warn!(error = %e, %type_name, "structured output failed to parse, retrying with repair instruction");
                    request.messages.push(Message::user(repair_instruction(&type_name, &e.to_string())));
                }
                Err(e) => return Err(AiClientError::UnstructuredOutput(e.to_string())),
            }
        }

        unreachable!("loop always returns within two attempts")
    }

    async fn embed(&self, texts: &[String], cancel: &Cancellation) -> AiClientResult<Vec<Vec<f32>>> {
        let model = self.embedding_model.clone();
        let texts = texts.to_vec();
        once_with_backoff(cancel, || self.client().embed(&model, &texts)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_new_carries_model_and_key() {
        let ai = OpenAi::new("sk-test", "gpt-4o");
        assert_eq!(ai.model, "gpt-4o");
        assert_eq!(ai.api_key, "sk-test");
        assert_eq!(ai.embedding_model, "text-embedding-3-small");
    }

    #[test]
    fn with_embedding_model_overrides_default() {
        let ai = OpenAi::new("sk-test", "gpt-4o").with_embedding_model("text-embedding-3-large");
        assert_eq!(ai.embedding_model, "text-embedding-3-large");
    }
}

mod client;
pub(crate) mod types;

use async_trait::async_trait;
use tracing::warn;

use crate::cancel::Cancellation;
use crate::error::{AiClientError, AiClientResult};
use crate::retry::once_with_backoff;
use crate::structured::{repair_instruction, StructuredOutput};
use crate::{CompletionRequest, CompletionResponse, LlmClient, Message, Role, Usage};

use client::ClaudeClient;
use types::*;

/// Claude-backed [`LlmClient`]. Structured output rides a forced single
/// tool-call since the Messages API has no native JSON mode. No embeddings
/// endpoint — `embed` always fails; pair with [`crate::OpenAi`] for C3.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), model: model.into(), base_url: None }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, std::env::VarError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key);
        match &self.base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        }
    }

    fn to_wire(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| match m.role {
                Role::User => WireMessage::user(&m.content),
                _ => WireMessage::assistant(&m.content),
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for Claude {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &Cancellation,
    ) -> AiClientResult<CompletionResponse> {
        let mut chat_request = ChatRequest::new(&self.model)
            .max_tokens(request.max_tokens)
            .temperature(request.temperature);
        if let Some(system) = &request.system {
            chat_request = chat_request.system(system.clone());
        }
        for m in Self::to_wire(&request.messages) {
            chat_request = chat_request.message(m);
        }

        let response = once_with_backoff(cancel, || self.client().chat(&chat_request)).await?;
        let text = response
            .text()
            .ok_or_else(|| AiClientError::ProviderUnavailable("no text block in response".into()))?;

        Ok(CompletionResponse {
            text,
            usage: Usage { prompt_tokens: response.usage.input_tokens, completion_tokens: response.usage.output_tokens },
        })
    }

    async fn complete_structured<T: StructuredOutput>(
        &self,
        mut request: CompletionRequest,
        cancel: &Cancellation,
    ) -> AiClientResult<T> {
        let schema = T::json_schema();
        let type_name = T::type_name();
        const TOOL_NAME: &str = "structured_response";

        for attempt in 0..2 {
            let mut chat_request = ChatRequest::new(&self.model)
                .max_tokens(request.max_tokens)
                .temperature(request.temperature)
                .tool(ToolDefinitionWire {
                    name: TOOL_NAME.to_string(),
                    description: format!("Emit the extracted `{type_name}` value."),
                    input_schema: schema.clone(),
                });
            chat_request.tool_choice = Some(serde_json::json!({ "type": "tool", "name": TOOL_NAME }));
            if let Some(system) = &request.system {
                chat_request = chat_request.system(system.clone());
            }
            for m in Self::to_wire(&request.messages) {
                chat_request = chat_request.message(m);
            }

            let response = once_with_backoff(cancel, || self.client().chat(&chat_request)).await?;
            let input = response.tool_input().cloned();

            match input.map(|v| serde_json::from_value::<T>(v)) {
                Some(Ok(value)) => return Ok(value),
                Some(Err(e)) if attempt == 0 => {
                    warn!(error = %e, %type_name, "structured tool call failed to parse, retrying with repair instruction");
                    request.messages.push(Message::user(repair_instruction(&type_name, &e.to_string())));
                }
                Some(Err(e)) => return Err(AiClientError::UnstructuredOutput(e.to_string())),
                None if attempt == 0 => {
                    request.messages.push(Message::user(repair_instruction(&type_name, "no tool_use block returned")));
                }
                None => return Err(AiClientError::UnstructuredOutput("no tool_use block returned".into())),
            }
        }

        unreachable!("loop always returns within two attempts")
    }

    async fn embed(&self, _texts: &[String], _cancel: &Cancellation) -> AiClientResult<Vec<Vec<f32>>> {
        Err(AiClientError::ProviderUnavailable("Claude has no embeddings endpoint".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_new_carries_model_and_key() {
        let ai = Claude::new("sk-ant-test", "claude-sonnet-4-20250514");
        assert_eq!(ai.model, "claude-sonnet-4-20250514");
        assert_eq!(ai.api_key, "sk-ant-test");
    }
}

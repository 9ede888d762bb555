use thiserror::Error;

/// Errors surfaced by any [`crate::LlmClient`] implementation.
///
/// These map 1:1 onto the `C4` failure kinds: transient provider failures are
/// retried once internally before becoming [`AiClientError::ProviderUnavailable`];
/// `ContextOverflow` and `UnstructuredOutput` are never retried by the client
/// itself (the former is the caller's fault, the latter has already consumed
/// its one repair attempt).
#[derive(Debug, Error)]
pub enum AiClientError {
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("prompt exceeded the model's context window")]
    ContextOverflow,

    #[error("model declined to produce valid structured output after one repair attempt: {0}")]
    UnstructuredOutput(String),

    #[error("request was cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type AiClientResult<T> = std::result::Result<T, AiClientError>;

use newsroom_common::NewsroomError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CardsError {
    #[error("sentiment provider failed: {0}")]
    SentimentProviderFailed(String),

    #[error("card synthesis provider failed: {0}")]
    SynthesisProviderFailed(String),

    #[error("card generation degraded: more than half of selected articles failed")]
    CardGenerationDegraded,
}

impl CardsError {
    pub fn to_newsroom(&self) -> NewsroomError {
        match self {
            CardsError::SentimentProviderFailed(m) => NewsroomError::ProviderUnavailable(m.clone()),
            CardsError::SynthesisProviderFailed(m) => NewsroomError::ProviderUnavailable(m.clone()),
            CardsError::CardGenerationDegraded => NewsroomError::Internal("card generation degraded".into()),
        }
    }
}

pub type CardsResult<T> = std::result::Result<T, CardsError>;

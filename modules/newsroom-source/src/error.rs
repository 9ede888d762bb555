use newsroom_common::NewsroomError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SourceError {
    #[error("search provider exhausted its retry budget: {0}")]
    ProviderUnavailable(String),

    #[error("search provider rate-limited the request: {0}")]
    ProviderRateLimited(String),

    #[error("search provider returned an unparseable payload: {0}")]
    InvalidResponse(String),

    #[error("search was cancelled")]
    Cancelled,
}

impl SourceError {
    pub fn to_newsroom(&self) -> NewsroomError {
        match self {
            SourceError::ProviderUnavailable(m) => NewsroomError::ProviderUnavailable(m.clone()),
            SourceError::ProviderRateLimited(m) => NewsroomError::ProviderRateLimited(m.clone()),
            SourceError::InvalidResponse(m) => NewsroomError::InvalidResponse(m.clone()),
            SourceError::Cancelled => NewsroomError::Cancelled,
        }
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

use newsroom_common::NewsroomError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding provider failed: {0}")]
    EmbeddingProviderFailed(String),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),
}

impl IndexError {
    pub fn to_newsroom(&self) -> NewsroomError {
        match self {
            IndexError::EmbeddingProviderFailed(m) => NewsroomError::ProviderUnavailable(m.clone()),
            IndexError::IndexUnavailable(m) => NewsroomError::IndexUnavailable(m.clone()),
        }
    }
}

impl From<sqlx::Error> for IndexError {
    fn from(e: sqlx::Error) -> Self {
        IndexError::IndexUnavailable(e.to_string())
    }
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

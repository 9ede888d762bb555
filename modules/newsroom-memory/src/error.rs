use newsroom_common::NewsroomError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("embedding provider failed while updating interest vector: {0}")]
    EmbeddingFailed(String),
}

impl MemoryError {
    pub fn to_newsroom(&self) -> NewsroomError {
        match self {
            MemoryError::StoreUnavailable(m) => NewsroomError::StoreUnavailable(m.clone()),
            MemoryError::EmbeddingFailed(m) => NewsroomError::ProviderUnavailable(m.clone()),
        }
    }
}

impl From<sqlx::Error> for MemoryError {
    fn from(e: sqlx::Error) -> Self {
        MemoryError::StoreUnavailable(e.to_string())
    }
}

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

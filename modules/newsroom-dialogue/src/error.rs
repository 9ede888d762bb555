use newsroom_common::NewsroomError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("article store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session has a turn already in flight")]
    SessionBusy,

    #[error("embedding provider failed: {0}")]
    EmbeddingFailed(String),

    #[error("generation provider failed: {0}")]
    GenerationFailed(String),

    #[error("turn deadline exceeded")]
    DeadlineExceeded,
}

impl DialogueError {
    pub fn to_newsroom(&self) -> NewsroomError {
        match self {
            DialogueError::IndexUnavailable(m) => NewsroomError::IndexUnavailable(m.clone()),
            DialogueError::StoreUnavailable(m) => NewsroomError::StoreUnavailable(m.clone()),
            DialogueError::SessionNotFound(id) => NewsroomError::NotFound { kind: "session", id: id.clone() },
            DialogueError::SessionBusy => NewsroomError::SessionBusy,
            DialogueError::EmbeddingFailed(m) => NewsroomError::ProviderUnavailable(m.clone()),
            DialogueError::GenerationFailed(m) => NewsroomError::ProviderUnavailable(m.clone()),
            DialogueError::DeadlineExceeded => NewsroomError::DeadlineExceeded,
        }
    }
}

pub type DialogueResult<T> = std::result::Result<T, DialogueError>;

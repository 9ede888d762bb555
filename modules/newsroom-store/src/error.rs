use newsroom_common::NewsroomError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("article store unavailable: {0}")]
    StoreUnavailable(String),

    /// Should be unreachable if fingerprint logic is correct (§4.2);
    /// surfaced distinctly so it is never silently mapped to `StoreUnavailable`.
    #[error("fingerprint constraint violated unexpectedly: {0}")]
    ConstraintViolation(String),
}

impl StoreError {
    pub fn to_newsroom(&self) -> NewsroomError {
        match self {
            StoreError::StoreUnavailable(m) => NewsroomError::StoreUnavailable(m.clone()),
            StoreError::ConstraintViolation(m) => NewsroomError::Internal(format!("article store constraint violation: {m}")),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.constraint().is_some() => StoreError::ConstraintViolation(e.to_string()),
            _ => StoreError::StoreUnavailable(e.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

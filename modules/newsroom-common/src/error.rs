//! The stable error taxonomy (§7), shared across every transport.
//!
//! Each component crate defines its own narrower `thiserror` enum and
//! exposes a `to_newsroom(&self) -> NewsroomError` inherent method that maps
//! its own
//! variants onto this taxonomy. We don't use a blanket `From` impl here
//! because `NewsroomError` and each component error type live in different
//! crates on both sides of the conversion — an inherent method sidesteps
//! Rust's orphan-impl rule while keeping the mapping explicit and reviewable
//! at the point each component error is defined.
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum NewsroomError {
    #[error("external dependency exhausted its retry budget: {0}")]
    ProviderUnavailable(String),

    #[error("external provider rate-limited the request: {0}")]
    ProviderRateLimited(String),

    #[error("upstream returned an unparseable or schema-violating payload: {0}")]
    InvalidResponse(String),

    #[error("prompt exceeded the model's context window")]
    ContextOverflow,

    #[error("model declined to produce valid structured output after one repair attempt: {0}")]
    UnstructuredOutput(String),

    #[error("persistence layer (document store) unavailable: {0}")]
    StoreUnavailable(String),

    #[error("persistence layer (vector index) unavailable: {0}")]
    IndexUnavailable(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("dialogue session has a turn already in flight")]
    SessionBusy,

    #[error("a pipeline run is already in flight for this user")]
    BusyRetry,

    #[error("deadline exceeded before the operation completed")]
    DeadlineExceeded,

    #[error("operation was cancelled by the caller")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl NewsroomError {
    /// HTTP status code per §7's propagation policy.
    pub fn http_status(&self) -> u16 {
        match self {
            NewsroomError::ProviderUnavailable(_) => 502,
            NewsroomError::ProviderRateLimited(_) => 502,
            NewsroomError::StoreUnavailable(_) => 503,
            NewsroomError::IndexUnavailable(_) => 503,
            NewsroomError::InvalidResponse(_) | NewsroomError::ContextOverflow | NewsroomError::UnstructuredOutput(_) => 400,
            NewsroomError::NotFound { .. } => 404,
            NewsroomError::SessionBusy | NewsroomError::BusyRetry => 429,
            NewsroomError::DeadlineExceeded => 504,
            NewsroomError::Cancelled => 499,
            NewsroomError::Internal(_) => 500,
        }
    }

    /// The stable taxonomy tag (§7), distinct from the human string, for
    /// machine consumers of the `{success, error}` envelope.
    pub fn tag(&self) -> &'static str {
        match self {
            NewsroomError::ProviderUnavailable(_) => "ProviderUnavailable",
            NewsroomError::ProviderRateLimited(_) => "ProviderRateLimited",
            NewsroomError::InvalidResponse(_) => "InvalidResponse",
            NewsroomError::ContextOverflow => "ContextOverflow",
            NewsroomError::UnstructuredOutput(_) => "UnstructuredOutput",
            NewsroomError::StoreUnavailable(_) => "StoreUnavailable",
            NewsroomError::IndexUnavailable(_) => "IndexUnavailable",
            NewsroomError::NotFound { .. } => "NotFound",
            NewsroomError::SessionBusy => "SessionBusy",
            NewsroomError::BusyRetry => "BusyRetry",
            NewsroomError::DeadlineExceeded => "DeadlineExceeded",
            NewsroomError::Cancelled => "Cancelled",
            NewsroomError::Internal(_) => "Internal",
        }
    }
}

pub type NewsroomResult<T> = std::result::Result<T, NewsroomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_kinds_map_to_429() {
        assert_eq!(NewsroomError::BusyRetry.http_status(), 429);
        assert_eq!(NewsroomError::SessionBusy.http_status(), 429);
    }

    #[test]
    fn not_found_maps_to_404() {
        let e = NewsroomError::NotFound { kind: "session", id: "abc".into() };
        assert_eq!(e.http_status(), 404);
        assert_eq!(e.tag(), "NotFound");
    }
}

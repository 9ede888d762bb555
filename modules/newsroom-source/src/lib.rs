mod backoff;
mod decorator;
pub mod error;
mod provider;
mod rate_limit;
mod searcher;

pub use decorator::RateLimitedSearcher;
pub use error::{SourceError, SourceResult};
pub use provider::HttpNewsSearcher;
pub use searcher::{dedup_by_url, NewsSearcher, SearchOptions, Window};

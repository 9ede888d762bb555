pub mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::{ArticleStore, PgArticleStore, TagRangeFilter, UpsertOutcome};

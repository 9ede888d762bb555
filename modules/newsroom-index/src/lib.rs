mod cache;
mod chunker;
mod embedder;
pub mod error;
mod index;

pub use cache::EmbeddingCache;
pub use chunker::{chunk_article, estimate_tokens, ChunkDraft};
pub use embedder::{EmbedOutcome, Embedder};
pub use error::{IndexError, IndexResult};
pub use index::{EmbeddingIndexer, IndexOutcome, PgVectorIndexer, ScoredChunk, VectorFilter};

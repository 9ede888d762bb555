mod decay;
pub mod error;
mod store;

pub use decay::decay_factor;
pub use error::{MemoryError, MemoryResult};
pub use store::{PgUserMemoryStore, UserMemoryStore};

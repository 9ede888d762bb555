pub mod concurrency;
pub mod error;
pub mod orchestrator;
pub mod run_store;

pub use concurrency::{ProviderSemaphores, UserLocks, UserSlotGuard};
pub use error::PipelineResult;
pub use orchestrator::{PipelineDeps, PipelineOrchestrator, PipelineRequest};
pub use run_store::{PgPipelineRunStore, PipelineRunStore};

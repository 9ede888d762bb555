use std::sync::Arc;

use newsroom_common::{AppConfig, FileConfig};
use newsroom_dialogue::{DialogueManager, SessionStore};
use newsroom_memory::UserMemoryStore;
use newsroom_pipeline::{PipelineOrchestrator, PipelineRunStore};

/// Everything the HTTP layer needs, composed once in `main` (§6). Cloned
/// cheaply per request via `Arc<AppState>` — a single struct of `Arc`s
/// rather than per-handler parameters.
pub struct AppState {
    pub orchestrator: PipelineOrchestrator,
    pub dialogue: DialogueManager,
    pub memory: Arc<dyn UserMemoryStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub runs: Arc<dyn PipelineRunStore>,
    pub config: Arc<AppConfig>,
    pub file_config: Arc<FileConfig>,
}

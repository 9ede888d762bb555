use newsroom_common::NewsroomError;

/// The orchestrator's own failure modes map directly onto two existing
/// taxonomy variants — unlike the component crates, there is no narrower
/// local enum here, because `run()` never originates a failure the taxonomy
/// doesn't already name (see `DESIGN.md`). Stage-level failures are captured
/// as `StageResult`/warning entries on the returned `PipelineRun`, not as an
/// `Err` from `run()`.
pub type PipelineResult<T> = std::result::Result<T, NewsroomError>;

/*
 * Codecheck Orchestration - Analysis Run Engine
 *
 * Drives a configured profile over an analysis scope:
 * - Reference graph construction (on demand)
 * - Global tool passes with scope intersection
 * - Concurrent local-tool pipeline (bounded queue, worker pool,
 *   write-lock-aware cancellation)
 * - Per-tool result presentations with previous-run diffing
 * - Batch cleanup (discover + apply fixes)
 */

// Public modules
pub mod cancel;
pub mod cleanup;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod presentation;
pub mod queue;

// Re-exports
pub use cancel::{CancelToken, WriteGate};
pub use cleanup::{run_cleanup, CleanupOutcome, CleanupProblems, CleanupReport, FamilyOutcome};
pub use error::{OrchestratorError, Result};
pub use events::{PostRunHook, ResultSink};
pub use orchestrator::{
    AnalysisSession, ResultsViewGuard, RunHandle, RunOptions, RunPhase, RunSummary,
};
pub use pipeline::{PipelineConfig, PipelineStats};
pub use presentation::{Presentations, ProblemStatus, ToolPresentation};
pub use queue::{FileProducer, FileQueue, DEFAULT_QUEUE_CAPACITY};

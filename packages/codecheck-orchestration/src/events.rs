//! Observer seams: result sinks and post-run hooks.

use crate::orchestrator::RunSummary;
use codecheck_core::{EntityKey, ProblemDescriptor};
use std::sync::Arc;

/// Notified with problems as they are produced. Consumed by out-of-core
/// collaborators (views, exporters); the engine renders nothing itself.
pub trait ResultSink: Send + Sync {
    fn problems_added(
        &self,
        tool_id: &str,
        entity: &EntityKey,
        descriptors: &[Arc<ProblemDescriptor>],
    );
}

/// Extension hook executed after all tool passes. A hook failure is logged
/// and never fails the run.
pub trait PostRunHook: Send + Sync {
    fn name(&self) -> &str {
        "post-run hook"
    }

    fn after_run(&self, summary: &RunSummary) -> anyhow::Result<()>;
}

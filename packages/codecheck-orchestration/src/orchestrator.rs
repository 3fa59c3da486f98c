//! Run orchestration: drives graph building, global tools, the local
//! pipeline, the external-usages pass, and post-run activities, aggregating
//! everything into per-tool presentations.

use crate::cancel::{CancelToken, WriteGate};
use crate::error::{OrchestratorError, Result};
use crate::events::{PostRunHook, ResultSink};
use crate::pipeline::{run_local_pipeline, PipelineConfig, PipelineContext, PipelineStats};
use crate::presentation::Presentations;
use chrono::{DateTime, Utc};
use codecheck_core::{
    AnalysisScope, CoreError, DeclarationProvider, FileOracle, NamedScope, Profile, RefGraph,
    ScopeToolState, TextRange, ToolStateSet,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Phase of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    GraphBuilding,
    RunningGlobalTools,
    RunningLocalPipeline,
    RunningExternalUsagesPass,
    PostRunActivities,
    Done,
    Cancelled,
    Failed,
}

impl RunPhase {
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            RunPhase::Idle | RunPhase::Done | RunPhase::Cancelled | RunPhase::Failed
        )
    }
}

/// Aggregated metrics of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub pipeline: PipelineStats,
    pub global_tool_failures: usize,
    pub problems_found: usize,
    pub cancelled: bool,
}

impl RunSummary {
    /// "No problems" is a real answer, distinct from "run failed".
    pub fn found_nothing(&self) -> bool {
        self.problems_found == 0 && !self.cancelled
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub pipeline: PipelineConfig,
}

/// One analysis session: owns the presentations (and therefore the diff
/// snapshots between runs), the write gate, and the observer seams.
pub struct AnalysisSession {
    oracle: Arc<dyn FileOracle>,
    provider: Option<Arc<dyn DeclarationProvider>>,
    sink: Option<Arc<dyn ResultSink>>,
    hooks: Vec<Arc<dyn PostRunHook>>,
    presentations: Arc<Presentations>,
    gate: WriteGate,
    phase: Arc<Mutex<RunPhase>>,
    run_active: Arc<AtomicBool>,
    open_views: Arc<AtomicUsize>,
    cleanup_pending: Arc<AtomicBool>,
}

impl AnalysisSession {
    pub fn new(oracle: Arc<dyn FileOracle>, diff_mode: bool) -> Self {
        Self {
            oracle,
            provider: None,
            sink: None,
            hooks: Vec::new(),
            presentations: Arc::new(Presentations::new(diff_mode)),
            gate: WriteGate::new(),
            phase: Arc::new(Mutex::new(RunPhase::Idle)),
            run_active: Arc::new(AtomicBool::new(false)),
            open_views: Arc::new(AtomicUsize::new(0)),
            cleanup_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Declaration provider for reference-graph construction. Required only
    /// when a global tool asks for the graph.
    pub fn with_provider(mut self, provider: Arc<dyn DeclarationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn add_hook(mut self, hook: Arc<dyn PostRunHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// The gate an external exclusive writer signals its intent through.
    pub fn write_gate(&self) -> &WriteGate {
        &self.gate
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock()
    }

    pub fn presentations(&self) -> Arc<Presentations> {
        self.presentations.clone()
    }

    /// Keep results alive past run end: end-of-run cleanup defers while any
    /// guard is open and happens on the last close.
    pub fn open_results_view(&self) -> ResultsViewGuard {
        self.open_views.fetch_add(1, Ordering::SeqCst);
        ResultsViewGuard {
            open_views: self.open_views.clone(),
            cleanup_pending: self.cleanup_pending.clone(),
            presentations: self.presentations.clone(),
        }
    }

    /// Start an analysis run. The profile must be initialized and is
    /// treated as read-only for the whole run.
    pub fn run_analysis(
        &self,
        profile: Arc<Profile>,
        scope: Arc<dyn AnalysisScope>,
        options: RunOptions,
    ) -> Result<RunHandle> {
        if self
            .run_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OrchestratorError::precondition(format!(
                "a run is already active (phase {:?})",
                self.phase()
            )));
        }
        let claim = RunClaim {
            run_active: self.run_active.clone(),
        };
        if !profile.is_initialized() {
            return Err(OrchestratorError::precondition(format!(
                "profile '{}' is not initialized",
                profile.name()
            )));
        }
        if self.gate.is_write_pending() {
            return Err(OrchestratorError::precondition(
                "cannot start a run while a write action is pending",
            ));
        }

        // Previous run's maintenance may have been deferred behind an open
        // results view; a new run forces it.
        if self.cleanup_pending.swap(false, Ordering::SeqCst) {
            self.presentations.end_of_run();
        }

        let token = CancelToken::new();
        let driver = RunDriver {
            profile,
            scope,
            oracle: self.oracle.clone(),
            provider: self.provider.clone(),
            sink: self.sink.clone(),
            hooks: self.hooks.clone(),
            presentations: self.presentations.clone(),
            gate: self.gate.clone(),
            phase: self.phase.clone(),
            open_views: self.open_views.clone(),
            cleanup_pending: self.cleanup_pending.clone(),
            token: token.clone(),
            options,
            _claim: claim,
        };

        // The handle itself keeps the results alive: end-of-run cleanup is
        // deferred until the handle (and any other open view) is gone, so
        // partial aggregates survive a cancellation and stay queryable.
        let view = self.open_results_view();

        let join = std::thread::Builder::new()
            .name("codecheck-run".to_string())
            .spawn(move || driver.drive())?;

        Ok(RunHandle {
            token,
            join: Mutex::new(Some(join)),
            presentations: self.presentations.clone(),
            _view: view,
        })
    }
}

/// Handle on a started run.
pub struct RunHandle {
    token: CancelToken,
    join: Mutex<Option<JoinHandle<Result<RunSummary>>>>,
    presentations: Arc<Presentations>,
    _view: ResultsViewGuard,
}

impl RunHandle {
    /// Request cancellation; the run winds down cooperatively.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the run to end. Cancellation is not an error: the summary
    /// comes back with `cancelled` set and the aggregates remain queryable.
    pub fn wait(&self) -> Result<RunSummary> {
        let handle = self
            .join
            .lock()
            .take()
            .ok_or_else(|| OrchestratorError::precondition("run already waited on"))?;
        handle
            .join()
            .map_err(|_| OrchestratorError::Other(anyhow::anyhow!("run thread panicked")))?
    }

    /// Aggregated per-tool results collected so far.
    pub fn results(&self) -> Arc<Presentations> {
        self.presentations.clone()
    }
}

/// Releases the session's single-run slot when the driver finishes (or
/// when starting the run fails).
struct RunClaim {
    run_active: Arc<AtomicBool>,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.run_active.store(false, Ordering::SeqCst);
    }
}

struct RunDriver {
    profile: Arc<Profile>,
    scope: Arc<dyn AnalysisScope>,
    oracle: Arc<dyn FileOracle>,
    provider: Option<Arc<dyn DeclarationProvider>>,
    sink: Option<Arc<dyn ResultSink>>,
    hooks: Vec<Arc<dyn PostRunHook>>,
    presentations: Arc<Presentations>,
    gate: WriteGate,
    phase: Arc<Mutex<RunPhase>>,
    open_views: Arc<AtomicUsize>,
    cleanup_pending: Arc<AtomicBool>,
    token: CancelToken,
    options: RunOptions,
    _claim: RunClaim,
}

impl RunDriver {
    fn set_phase(&self, phase: RunPhase) {
        *self.phase.lock() = phase;
    }

    fn drive(self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!("run {} starting over {}", run_id, self.scope.display_name());

        let tools = self.profile.tools_snapshot();
        let mut cancelled = false;
        let mut pipeline_stats = PipelineStats::default();
        let mut global_failures = 0usize;

        let outcome = self.run_phases(&tools, &mut pipeline_stats, &mut global_failures);
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                cancelled = true;
                self.set_phase(RunPhase::Cancelled);
                info!("run {} cancelled; partial results remain valid", run_id);
            }
            Err(e) => {
                self.set_phase(RunPhase::Failed);
                error!("run {} failed: {}", run_id, e);
                self.finish_presentations();
                return Err(e);
            }
        }

        let mut summary = RunSummary {
            run_id,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            pipeline: pipeline_stats,
            global_tool_failures: global_failures,
            problems_found: self.presentations.total_problems(),
            cancelled,
        };

        if !cancelled {
            self.set_phase(RunPhase::PostRunActivities);
            for hook in &self.hooks {
                if let Err(e) = hook.after_run(&summary) {
                    warn!("post-run hook '{}' failed: {}", hook.name(), e);
                }
            }
            summary.duration_ms = start.elapsed().as_millis() as u64;
            self.set_phase(RunPhase::Done);
        }

        if summary.found_nothing() {
            info!("run {} finished: no problems", run_id);
        } else {
            info!(
                "run {} finished: {} problems across {} files in {}ms",
                run_id,
                summary.problems_found,
                summary.pipeline.files_processed,
                summary.duration_ms
            );
        }

        self.finish_presentations();
        Ok(summary)
    }

    fn run_phases(
        &self,
        tools: &[ToolStateSet],
        pipeline_stats: &mut PipelineStats,
        global_failures: &mut usize,
    ) -> Result<()> {
        // Graph building, only if some enabled global tool asked for it.
        let graph = self.build_graph_if_needed(tools)?;

        self.set_phase(RunPhase::RunningGlobalTools);
        let mut external_pass: Vec<ScopeToolState> = Vec::new();
        self.run_global_tools(tools, graph.as_ref(), global_failures, &mut external_pass)?;

        self.set_phase(RunPhase::RunningLocalPipeline);
        *pipeline_stats = run_local_pipeline(PipelineContext {
            tools,
            scope: self.scope.as_ref(),
            oracle: self.oracle.as_ref(),
            presentations: self.presentations.as_ref(),
            sink: self.sink.as_deref(),
            gate: &self.gate,
            token: &self.token,
            config: self.options.pipeline.clone(),
        })?;
        self.token.check()?;

        if !external_pass.is_empty() {
            self.set_phase(RunPhase::RunningExternalUsagesPass);
            self.run_external_usages(graph.as_ref(), &external_pass, global_failures)?;
        }

        Ok(())
    }

    fn build_graph_if_needed(&self, tools: &[ToolStateSet]) -> Result<Option<RefGraph>> {
        let needs_graph = tools.iter().any(|set| {
            set.is_enabled()
                && set.states().any(|state| {
                    state.enabled
                        && state
                            .tool
                            .capability()
                            .global_tool()
                            .is_some_and(|g| g.needs_reference_graph())
                })
        });
        if !needs_graph {
            return Ok(None);
        }

        self.set_phase(RunPhase::GraphBuilding);
        let provider = self.provider.as_ref().ok_or_else(|| {
            OrchestratorError::GraphBuild(
                "a global tool requires the reference graph but no declaration provider is configured"
                    .to_string(),
            )
        })?;

        let token = &self.token;
        let graph = RefGraph::build(self.scope.as_ref(), provider.as_ref(), &|| {
            !token.is_cancelled()
        })
        .map_err(|e| {
            if self.token.is_cancelled() {
                OrchestratorError::Cancelled
            } else {
                match e {
                    CoreError::GraphBuild(msg) => OrchestratorError::GraphBuild(msg),
                    other => OrchestratorError::Core(other),
                }
            }
        })?;
        info!("reference graph built: {} entities", graph.len());
        Ok(Some(graph))
    }

    /// Global tools, per enabled state in list order, each over the
    /// intersection of its named scope with the analysis scope. Tool-level
    /// failures are logged and isolated.
    fn run_global_tools(
        &self,
        tools: &[ToolStateSet],
        graph: Option<&RefGraph>,
        failures: &mut usize,
        external_pass: &mut Vec<ScopeToolState>,
    ) -> Result<()> {
        for set in tools {
            if !set.is_enabled() {
                continue;
            }
            for state in set.states() {
                self.token.check()?;
                if !state.enabled {
                    continue;
                }
                let Some(global) = state.tool.capability().global_tool() else {
                    continue;
                };

                let sub_scope = IntersectionScope {
                    named: state.scope.clone(),
                    base: self.scope.clone(),
                };
                match global.check_scope(&sub_scope, graph, &state.tool.settings) {
                    Ok(results) => {
                        for (entity, descriptors) in results {
                            crate::pipeline::deliver_problems(
                                self.presentations.as_ref(),
                                self.sink.as_deref(),
                                self.oracle.as_ref(),
                                &state.tool,
                                entity,
                                descriptors,
                            );
                        }
                    }
                    Err(e) => {
                        error!("global tool '{}' failed: {}", state.tool.id(), e);
                        *failures += 1;
                    }
                }

                if global.may_have_external_usages() && !self.scope.is_whole_project() {
                    external_pass.push(state.clone());
                }
            }
        }
        Ok(())
    }

    /// Second pass for tools that may have usages outside the scope;
    /// results merge into the same presentations.
    fn run_external_usages(
        &self,
        graph: Option<&RefGraph>,
        flagged: &[ScopeToolState],
        failures: &mut usize,
    ) -> Result<()> {
        for state in flagged {
            self.token.check()?;
            let Some(global) = state.tool.capability().global_tool() else {
                continue;
            };
            let sub_scope = IntersectionScope {
                named: state.scope.clone(),
                base: self.scope.clone(),
            };
            match global.check_external_usages(&sub_scope, graph, &state.tool.settings) {
                Ok(results) => {
                    for (entity, descriptors) in results {
                        crate::pipeline::deliver_problems(
                            self.presentations.as_ref(),
                            self.sink.as_deref(),
                            self.oracle.as_ref(),
                            &state.tool,
                            entity,
                            descriptors,
                        );
                    }
                }
                Err(e) => {
                    error!(
                        "external-usages pass of '{}' failed: {}",
                        state.tool.id(),
                        e
                    );
                    *failures += 1;
                }
            }
        }
        Ok(())
    }

    /// End-of-run presentation maintenance, deferred while a results view
    /// is open.
    fn finish_presentations(&self) {
        if self.open_views.load(Ordering::SeqCst) > 0 {
            self.cleanup_pending.store(true, Ordering::SeqCst);
        } else {
            self.presentations.end_of_run();
        }
    }
}

/// RAII guard keeping run results alive; the deferred end-of-run cleanup
/// happens when the last guard drops.
pub struct ResultsViewGuard {
    open_views: Arc<AtomicUsize>,
    cleanup_pending: Arc<AtomicBool>,
    presentations: Arc<Presentations>,
}

impl Drop for ResultsViewGuard {
    fn drop(&mut self) {
        if self.open_views.fetch_sub(1, Ordering::SeqCst) == 1
            && self.cleanup_pending.swap(false, Ordering::SeqCst)
        {
            self.presentations.end_of_run();
        }
    }
}

/// Intersection of a named scope with the overall analysis scope.
struct IntersectionScope {
    named: Option<Arc<NamedScope>>,
    base: Arc<dyn AnalysisScope>,
}

impl AnalysisScope for IntersectionScope {
    fn contains(&self, file: &Path) -> bool {
        self.base.contains(file)
            && self
                .named
                .as_ref()
                .map_or(true, |scope| scope.contains(file))
    }

    fn enumerate(&self) -> Box<dyn Iterator<Item = PathBuf> + Send + '_> {
        match &self.named {
            None => self.base.enumerate(),
            Some(scope) => {
                let scope = scope.clone();
                Box::new(
                    self.base
                        .enumerate()
                        .filter(move |file| scope.contains(file)),
                )
            }
        }
    }

    fn is_whole_project(&self) -> bool {
        self.named.is_none() && self.base.is_whole_project()
    }

    fn single_selection(&self) -> Option<(PathBuf, TextRange)> {
        self.base.single_selection()
    }

    fn display_name(&self) -> String {
        match &self.named {
            Some(scope) => format!("{} ∩ {}", scope.name(), self.base.display_name()),
            None => self.base.display_name(),
        }
    }
}

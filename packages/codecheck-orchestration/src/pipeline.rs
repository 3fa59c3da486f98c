//! The local-tool pipeline: one scanning thread producing eligible files
//! into a bounded queue, a worker pool draining it.
//!
//! Workers complete files in no particular order; per-file results are
//! buffered and committed to the presentations only when the file finishes,
//! so a write-lock pause can retry a file without duplicating findings.

use crate::cancel::{CancelToken, WriteGate};
use crate::error::Result;
use crate::events::ResultSink;
use crate::presentation::Presentations;
use crate::queue::{FileQueue, DEFAULT_QUEUE_CAPACITY};
use codecheck_core::{
    AnalysisScope, EntityKey, FileOracle, ProblemDescriptor, ToolHandle, ToolStateSet,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How long to wait for the scanning thread to acknowledge a stop request
/// before logging a diagnostic.
const SCANNER_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: (num_cpus::get() * 3 / 4).max(1), // 75% of cores
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PipelineStats {
    pub files_scheduled: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub tool_failures: usize,
    pub write_pauses: usize,
}

pub(crate) struct PipelineContext<'a> {
    pub tools: &'a [ToolStateSet],
    pub scope: &'a dyn AnalysisScope,
    pub oracle: &'a dyn FileOracle,
    pub presentations: &'a Presentations,
    pub sink: Option<&'a dyn ResultSink>,
    pub gate: &'a WriteGate,
    pub token: &'a CancelToken,
    pub config: PipelineConfig,
}

/// Run every enabled local and global-simple tool variant applicable to
/// `file`, in deterministic set order, with a cancellation check between
/// tool invocations. Annotator-style tools get their deferred collect step
/// after the main loop. Failures are isolated per tool and counted.
pub(crate) fn run_tools_on_file(
    tools: &[ToolStateSet],
    file: &Path,
    token: &CancelToken,
    batch: bool,
    on_problems: &mut dyn FnMut(&ToolHandle, Vec<ProblemDescriptor>),
) -> Result<usize> {
    let mut failures = 0;
    let mut deferred: Vec<ToolHandle> = Vec::new();

    for set in tools {
        token.check()?;
        let Some(handle) = set.tool_for(Some(file)) else {
            continue;
        };
        let Some(local) = handle.capability().local_tool() else {
            continue;
        };
        match local.check_file(file, &handle.settings, batch) {
            Ok(descriptors) => {
                if !descriptors.is_empty() {
                    on_problems(handle, descriptors);
                }
            }
            Err(e) => {
                warn!(
                    "tool '{}' failed on {}: {}",
                    handle.id(),
                    file.display(),
                    e
                );
                failures += 1;
            }
        }
        if local.has_deferred_pass() {
            deferred.push(handle.clone());
        }
    }

    for handle in &deferred {
        token.check()?;
        let Some(local) = handle.capability().local_tool() else {
            continue;
        };
        match local.collect_deferred(file, &handle.settings) {
            Ok(descriptors) => {
                if !descriptors.is_empty() {
                    on_problems(handle, descriptors);
                }
            }
            Err(e) => {
                warn!(
                    "deferred pass of '{}' failed on {}: {}",
                    handle.id(),
                    file.display(),
                    e
                );
                failures += 1;
            }
        }
    }

    Ok(failures)
}

/// Commit one tool's findings for one entity, filtering suppressed
/// locations, and notify the sink.
pub(crate) fn deliver_problems(
    presentations: &Presentations,
    sink: Option<&dyn ResultSink>,
    oracle: &dyn FileOracle,
    handle: &ToolHandle,
    entity: EntityKey,
    descriptors: Vec<ProblemDescriptor>,
) {
    let tool_id = handle.id();
    let alternative = handle.descriptor.alternative_id.as_deref();
    let suppressed = |d: &ProblemDescriptor| {
        oracle.is_suppressed_at(&d.location, tool_id)
            || alternative.is_some_and(|alt| oracle.is_suppressed_at(&d.location, alt))
    };

    let presentation = presentations.for_tool(tool_id);
    let added = presentation.add_problems(entity.clone(), descriptors, Some(&suppressed));
    if !added.is_empty() {
        if let Some(sink) = sink {
            sink.problems_added(tool_id, &entity, &added);
        }
    }
}

/// Drive the producer/consumer pipeline over the scope.
pub(crate) fn run_local_pipeline(ctx: PipelineContext<'_>) -> Result<PipelineStats> {
    let (producer, queue) = FileQueue::bounded(ctx.config.queue_capacity.max(1));
    let worker_count = ctx.config.worker_count.max(1);

    let scheduled = AtomicUsize::new(0);
    let processed = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);
    let pauses = AtomicUsize::new(0);

    let (scan_done_tx, scan_done_rx) = crossbeam_channel::bounded::<()>(1);

    thread::scope(|s| -> Result<()> {
        let scheduled = &scheduled;
        let processed = &processed;
        let skipped = &skipped;
        let failures = &failures;
        let pauses = &pauses;
        let queue = &queue;
        let scope = ctx.scope;
        let oracle = ctx.oracle;
        let tools = ctx.tools;
        let presentations = ctx.presentations;
        let sink = ctx.sink;
        let gate = ctx.gate;
        let token = ctx.token;

        // Scanner: pure production, no tool execution.
        let scanner_token = token.clone();
        thread::Builder::new()
            .name("codecheck-scanner".to_string())
            .spawn_scoped(s, move || {
                let mut visited: HashSet<PathBuf> = HashSet::new();
                for file in scope.enumerate() {
                    if scanner_token.is_cancelled() {
                        break;
                    }
                    if !visited.insert(file.clone()) {
                        continue;
                    }
                    if oracle.is_binary(&file)
                        || oracle.is_too_large(&file)
                        || !oracle.is_in_index(&file)
                    {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    scheduled.fetch_add(1, Ordering::Relaxed);
                    if !producer.push(file, &scanner_token) {
                        break;
                    }
                }
                producer.finish(&scanner_token);
                let _ = scan_done_tx.send(());
            })?;

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker_token = token.clone();
            let handle = thread::Builder::new()
                .name(format!("codecheck-worker-{index}"))
                .spawn_scoped(s, move || {
                    while let Some(file) = queue.take(&worker_token) {
                        match process_with_write_retry(
                            &file,
                            tools,
                            oracle,
                            presentations,
                            sink,
                            gate,
                            &worker_token,
                            failures,
                            pauses,
                        ) {
                            Ok(()) => {
                                processed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(_) => break, // run cancelled
                        }
                    }
                })?;
            workers.push(handle);
        }

        for worker in workers {
            if worker.join().is_err() {
                error!("analysis worker panicked");
            }
        }

        // Workers are done; the scanner must wind down promptly. A stuck
        // scanner is an operational error, not a silent hang.
        if scan_done_rx.recv_timeout(SCANNER_JOIN_TIMEOUT).is_err() && !queue.is_done() {
            error!(
                "scanning thread 'codecheck-scanner' did not stop within {:?} (possible deadlock)",
                SCANNER_JOIN_TIMEOUT
            );
        }
        Ok(())
    })?;

    let stats = PipelineStats {
        files_scheduled: scheduled.load(Ordering::Relaxed),
        files_processed: processed.load(Ordering::Relaxed),
        files_skipped: skipped.load(Ordering::Relaxed),
        tool_failures: failures.load(Ordering::Relaxed),
        write_pauses: pauses.load(Ordering::Relaxed),
    };
    debug!(
        "local pipeline done: {} scheduled, {} processed, {} skipped",
        stats.files_scheduled, stats.files_processed, stats.files_skipped
    );
    Ok(stats)
}

/// Process one file under a fresh derived sub-progress. A cancellation
/// caused by pending write intent is not fatal: wait for the writer, then
/// retry the same file. Buffered findings from the aborted attempt are
/// dropped, so the retry cannot double-report.
#[allow(clippy::too_many_arguments)]
fn process_with_write_retry(
    file: &Path,
    tools: &[ToolStateSet],
    oracle: &dyn FileOracle,
    presentations: &Presentations,
    sink: Option<&dyn ResultSink>,
    gate: &WriteGate,
    run_token: &CancelToken,
    failures: &AtomicUsize,
    pauses: &AtomicUsize,
) -> Result<()> {
    loop {
        let file_token = gate.derive(run_token);
        let mut buffered: Vec<(ToolHandle, Vec<ProblemDescriptor>)> = Vec::new();

        let outcome = run_tools_on_file(tools, file, &file_token, true, &mut |handle, problems| {
            buffered.push((handle.clone(), problems));
        });

        match outcome {
            Ok(tool_failures) => {
                failures.fetch_add(tool_failures, Ordering::Relaxed);
                for (handle, problems) in buffered {
                    deliver_problems(
                        presentations,
                        sink,
                        oracle,
                        &handle,
                        EntityKey::File(file.to_path_buf()),
                        problems,
                    );
                }
                return Ok(());
            }
            Err(e) if e.is_cancelled() => {
                run_token.check()?;
                // Derived token cancelled while the run is alive: a writer
                // holds priority. Wait it out, then redo this file.
                pauses.fetch_add(1, Ordering::Relaxed);
                gate.wait_write_complete();
            }
            Err(e) => return Err(e),
        }
    }
}

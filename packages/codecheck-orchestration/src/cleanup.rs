//! Batch cleanup: discover problems from cleanup-capable tools, then apply
//! their fixes.
//!
//! Discovery reuses the same per-file execution primitive as the local
//! pipeline. Descriptors are collected into a total order so fix
//! application is reproducible; application itself is guarded per fix, so
//! an already-invalidated location is skipped instead of erroring.

use crate::cancel::CancelToken;
use crate::error::{OrchestratorError, Result};
use crate::pipeline::run_tools_on_file;
use codecheck_core::{
    AnalysisScope, FileOracle, ProblemDescriptor, Profile, QuickFix, ToolStateSet,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What cleanup discovery found.
pub struct CleanupProblems {
    /// Affected files, sorted.
    pub files: Vec<PathBuf>,
    /// Descriptors in a total order: file path, range start, range end,
    /// message.
    pub problems: Vec<ProblemDescriptor>,
    pub is_global_scope: bool,
}

impl CleanupProblems {
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Per fix-family application counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FamilyOutcome {
    pub applied: usize,
    pub skipped_invalid: usize,
}

/// Aggregated batch outcome; never a silent first-failure abort.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupOutcome {
    pub applied: usize,
    pub skipped_invalid: usize,
    pub per_family: HashMap<String, FamilyOutcome>,
}

impl CleanupOutcome {
    pub fn is_full_success(&self) -> bool {
        self.skipped_invalid == 0
    }
}

/// Discovery result plus everything needed to apply it.
pub struct CleanupReport {
    problems: CleanupProblems,
    oracle: Arc<dyn FileOracle>,
}

impl CleanupReport {
    pub fn problems(&self) -> &CleanupProblems {
        &self.problems
    }

    /// Apply fixes, file by file.
    ///
    /// Every affected file must be writable up front or the whole batch
    /// fails. Within a file, fixes apply in descending range order so
    /// earlier edits cannot shift later ranges; a fix whose pinned original
    /// text no longer matches is counted as skipped.
    pub fn apply(&self) -> Result<CleanupOutcome> {
        let fixes: Vec<&QuickFix> = self
            .problems
            .problems
            .iter()
            .filter_map(|problem| problem.fixes.first())
            .collect();

        let mut touched: HashSet<PathBuf> = self.problems.files.iter().cloned().collect();
        touched.extend(fixes.iter().map(|fix| fix.edit.file.clone()));
        for file in &touched {
            if !self.oracle.make_writable(file) {
                return Err(OrchestratorError::FixApplication(format!(
                    "file is not writable: {}",
                    file.display()
                )));
            }
        }

        let mut by_file: BTreeMap<PathBuf, Vec<&QuickFix>> = BTreeMap::new();
        for fix in fixes {
            by_file.entry(fix.edit.file.clone()).or_default().push(fix);
        }

        let mut outcome = CleanupOutcome::default();
        for (file, mut file_fixes) in by_file {
            file_fixes.sort_by(|a, b| {
                b.edit
                    .range
                    .start
                    .cmp(&a.edit.range.start)
                    .then(b.edit.range.end.cmp(&a.edit.range.end))
            });

            let mut content = match std::fs::read(&file) {
                Ok(content) => content,
                Err(e) => {
                    warn!("cannot read {} for fixing: {}", file.display(), e);
                    for fix in &file_fixes {
                        record(&mut outcome, fix, false);
                    }
                    continue;
                }
            };

            let mut changed = false;
            for fix in &file_fixes {
                let range = fix.edit.range;
                let valid = range.start <= range.end
                    && range.end <= content.len()
                    && &content[range.start..range.end] == fix.edit.original.as_bytes();
                if valid {
                    content.splice(range.start..range.end, fix.edit.replacement.bytes());
                    changed = true;
                }
                record(&mut outcome, fix, valid);
            }

            if changed {
                std::fs::write(&file, &content)?;
            }
        }

        info!(
            "cleanup applied {} fixes, skipped {} invalidated",
            outcome.applied, outcome.skipped_invalid
        );
        Ok(outcome)
    }
}

fn record(outcome: &mut CleanupOutcome, fix: &QuickFix, applied: bool) {
    let family = outcome.per_family.entry(fix.family_id.clone()).or_default();
    if applied {
        family.applied += 1;
        outcome.applied += 1;
    } else {
        family.skipped_invalid += 1;
        outcome.skipped_invalid += 1;
    }
}

/// Discover cleanup problems over a scope.
///
/// Only cleanup-tagged enabled tools run, together with their declared
/// dependent tools; when the scope is a single in-file selection, results
/// are clipped to it; the caller's predicate has the last word.
pub fn run_cleanup(
    scope: &dyn AnalysisScope,
    profile: &Profile,
    oracle: Arc<dyn FileOracle>,
    should_apply: &dyn Fn(&ProblemDescriptor) -> bool,
    token: &CancelToken,
) -> Result<CleanupReport> {
    if !profile.is_initialized() {
        return Err(OrchestratorError::precondition(format!(
            "profile '{}' is not initialized",
            profile.name()
        )));
    }

    let snapshot = profile.tools_snapshot();
    let relevant = cleanup_tool_sets(&snapshot);
    debug!("cleanup runs {} tool(s)", relevant.len());

    let selection = scope.single_selection();
    let mut problems: Vec<ProblemDescriptor> = Vec::new();

    for file in scope.enumerate() {
        token.check()?;
        if oracle.is_binary(&file) || oracle.is_too_large(&file) || !oracle.is_in_index(&file) {
            continue;
        }
        run_tools_on_file(&relevant, &file, token, true, &mut |handle, found| {
            let tool_id = handle.id().to_string();
            let alternative = handle.descriptor.alternative_id.clone();
            for descriptor in found {
                let suppressed = oracle.is_suppressed_at(&descriptor.location, &tool_id)
                    || alternative
                        .as_deref()
                        .is_some_and(|alt| oracle.is_suppressed_at(&descriptor.location, alt));
                if suppressed {
                    continue;
                }
                if let Some((sel_file, sel_range)) = &selection {
                    if &descriptor.location.file != sel_file
                        || !descriptor.location.range.intersects(sel_range)
                    {
                        continue;
                    }
                }
                if should_apply(&descriptor) {
                    problems.push(descriptor);
                }
            }
        })?;
    }

    problems.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

    let mut files: Vec<PathBuf> = problems
        .iter()
        .map(|problem| problem.location.file.clone())
        .collect();
    files.sort();
    files.dedup();

    Ok(CleanupReport {
        problems: CleanupProblems {
            files,
            problems,
            is_global_scope: scope.is_whole_project(),
        },
        oracle,
    })
}

/// Cleanup-capable enabled tool sets plus their enabled dependent tools, in
/// deterministic (tool id) order.
fn cleanup_tool_sets(snapshot: &[ToolStateSet]) -> Vec<ToolStateSet> {
    let mut wanted: HashSet<&str> = HashSet::new();
    for set in snapshot {
        if !set.is_enabled() {
            continue;
        }
        let descriptor = &set.default_state().tool.descriptor;
        if descriptor.cleanup_capable {
            wanted.insert(set.tool_id());
            for dependent in &descriptor.dependent_tools {
                wanted.insert(dependent.as_str());
            }
        }
    }
    snapshot
        .iter()
        .filter(|set| set.is_enabled() && wanted.contains(set.tool_id()))
        .cloned()
        .collect()
}

//! Per-tool aggregation of findings, with diffing against the previous run.
//!
//! Presentations are created lazily per tool on first use in a run and
//! mutated concurrently by many workers; every merge is a commutative
//! append, so worker completion order never changes the aggregate. Cleared
//! at run end unless a results view is still open.

use codecheck_core::{EntityKey, ProblemDescriptor, ProblemKey};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Diff classification of one descriptor against the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemStatus {
    Added,
    Removed,
    Unchanged,
}

/// Mutable result bag for one tool across one run.
pub struct ToolPresentation {
    tool_id: String,
    diff_mode: bool,
    /// entity -> current problems; append semantics, no dedup.
    current: DashMap<EntityKey, Vec<Arc<ProblemDescriptor>>>,
    /// entity -> problems the user chose to ignore this run.
    ignored: DashMap<EntityKey, Vec<Arc<ProblemDescriptor>>>,
    /// Reverse mapping: descriptor identity -> owning entity.
    owners: DashMap<ProblemKey, EntityKey>,
    /// fix family -> descriptors carrying such a fix ("apply to all").
    fix_index: DashMap<String, Vec<Arc<ProblemDescriptor>>>,
    /// Previous run's problems, keyed structurally. Only read in diff mode.
    snapshot: RwLock<HashMap<ProblemKey, Arc<ProblemDescriptor>>>,
}

impl ToolPresentation {
    pub fn new(tool_id: impl Into<String>, diff_mode: bool) -> Self {
        Self {
            tool_id: tool_id.into(),
            diff_mode,
            current: DashMap::new(),
            ignored: DashMap::new(),
            owners: DashMap::new(),
            fix_index: DashMap::new(),
            snapshot: RwLock::new(HashMap::new()),
        }
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    /// Merge descriptors into the entity's current list. Suppressed
    /// descriptors (per the filter, when given) are dropped before
    /// aggregation. Returns what was actually added, for sink notification.
    pub fn add_problems(
        &self,
        entity: EntityKey,
        descriptors: Vec<ProblemDescriptor>,
        suppressed: Option<&(dyn Fn(&ProblemDescriptor) -> bool + Sync)>,
    ) -> Vec<Arc<ProblemDescriptor>> {
        let mut added = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if let Some(filter) = suppressed {
                if filter(&descriptor) {
                    continue;
                }
            }
            let descriptor = Arc::new(descriptor);
            self.owners.insert(descriptor.key(), entity.clone());
            for fix in &descriptor.fixes {
                self.fix_index
                    .entry(fix.family_id.clone())
                    .or_default()
                    .push(descriptor.clone());
            }
            added.push(descriptor);
        }
        if !added.is_empty() {
            self.current
                .entry(entity)
                .or_default()
                .extend(added.iter().cloned());
        }
        added
    }

    /// Move a problem from the current list into the ignored bag.
    pub fn ignore_problem(&self, key: &ProblemKey) -> bool {
        let Some(entity) = self.owners.get(key).map(|e| e.value().clone()) else {
            return false;
        };
        let Some(mut problems) = self.current.get_mut(&entity) else {
            return false;
        };
        let Some(index) = problems.iter().position(|p| &p.key() == key) else {
            return false;
        };
        let descriptor = problems.remove(index);
        drop(problems);
        self.ignored.entry(entity).or_default().push(descriptor);
        true
    }

    pub fn problems_for(&self, entity: &EntityKey) -> Vec<Arc<ProblemDescriptor>> {
        self.current
            .get(entity)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    pub fn all_problems(&self) -> Vec<Arc<ProblemDescriptor>> {
        let mut all: Vec<Arc<ProblemDescriptor>> = self
            .current
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        all
    }

    pub fn problem_count(&self) -> usize {
        self.current.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn has_problems(&self) -> bool {
        self.problem_count() > 0
    }

    pub fn entity_of(&self, key: &ProblemKey) -> Option<EntityKey> {
        self.owners.get(key).map(|e| e.value().clone())
    }

    /// Descriptors carrying a fix of the given family.
    pub fn problems_with_fix(&self, family_id: &str) -> Vec<Arc<ProblemDescriptor>> {
        self.fix_index
            .get(family_id)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    /// Diff status of a descriptor. Everything is `Unchanged` when diff
    /// mode is off. Identity is structural: containing file + range +
    /// message.
    pub fn status_of(&self, descriptor: &ProblemDescriptor) -> ProblemStatus {
        if !self.diff_mode {
            return ProblemStatus::Unchanged;
        }
        let key = descriptor.key();
        let in_snapshot = self.snapshot.read().contains_key(&key);
        let in_current = self.owners.contains_key(&key);
        match (in_current, in_snapshot) {
            (true, false) => ProblemStatus::Added,
            (false, true) => ProblemStatus::Removed,
            _ => ProblemStatus::Unchanged,
        }
    }

    /// Problems present in the previous run's snapshot but absent now.
    pub fn removed_problems(&self) -> Vec<Arc<ProblemDescriptor>> {
        if !self.diff_mode {
            return Vec::new();
        }
        let snapshot = self.snapshot.read();
        let mut removed: Vec<Arc<ProblemDescriptor>> = snapshot
            .iter()
            .filter(|(key, _)| !self.owners.contains_key(*key))
            .map(|(_, descriptor)| descriptor.clone())
            .collect();
        removed.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        removed
    }

    /// End-of-run maintenance: in diff mode the next snapshot becomes the
    /// union of this run's ignored and current problems; otherwise the
    /// snapshot is cleared. All per-run maps are released either way.
    pub fn end_of_run(&self) {
        {
            let mut snapshot = self.snapshot.write();
            snapshot.clear();
            if self.diff_mode {
                for entry in self.current.iter() {
                    for descriptor in entry.value() {
                        snapshot.insert(descriptor.key(), descriptor.clone());
                    }
                }
                for entry in self.ignored.iter() {
                    for descriptor in entry.value() {
                        snapshot.insert(descriptor.key(), descriptor.clone());
                    }
                }
            }
        }
        self.current.clear();
        self.ignored.clear();
        self.owners.clear();
        self.fix_index.clear();
    }
}

/// Lazily created per-tool presentations for one session.
pub struct Presentations {
    map: DashMap<String, Arc<ToolPresentation>>,
    diff_mode: bool,
}

impl Presentations {
    pub fn new(diff_mode: bool) -> Self {
        Self {
            map: DashMap::new(),
            diff_mode,
        }
    }

    pub fn diff_mode(&self) -> bool {
        self.diff_mode
    }

    /// Presentation for a tool, created on first use.
    pub fn for_tool(&self, tool_id: &str) -> Arc<ToolPresentation> {
        self.map
            .entry(tool_id.to_string())
            .or_insert_with(|| Arc::new(ToolPresentation::new(tool_id, self.diff_mode)))
            .clone()
    }

    pub fn get(&self, tool_id: &str) -> Option<Arc<ToolPresentation>> {
        self.map.get(tool_id).map(|p| p.value().clone())
    }

    pub fn tool_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.map.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn total_problems(&self) -> usize {
        self.map.iter().map(|e| e.value().problem_count()).sum()
    }

    pub fn end_of_run(&self) {
        for entry in self.map.iter() {
            entry.value().end_of_run();
        }
    }
}

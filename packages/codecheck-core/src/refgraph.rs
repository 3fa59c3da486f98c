//! Declaration cross-reference graph for global tools.
//!
//! Built once per run, on demand, from the declarations a host-supplied
//! provider extracts per file. Nodes live in an arena addressed by integer
//! ids; edges are id lists, so the whole graph is freed wholesale at run end
//! with no traversal-based teardown. The graph may be cyclic, including
//! self-cycles.

use crate::analysis::AnalysisScope;
use crate::error::{CoreError, Result, ToolResult};
use crate::problem::Location;
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Handle into the graph arena.
pub type EntityId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Module,
    Type,
    Function,
    Field,
    Other,
}

/// One declaration extracted from a file, before graph resolution.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub qualified_name: String,
    pub kind: DeclKind,
    pub location: Location,
    /// Qualified names this declaration references. Names that resolve to no
    /// declaration in the scope are treated as external and dropped.
    pub references: Vec<String>,
    /// Roots of the reachability pass (entry points are always reachable).
    pub entry_point: bool,
}

/// Extracts declarations per file. Supplied by the host; rule logic and
/// parsing are not part of the engine.
pub trait DeclarationProvider: Send + Sync {
    fn declarations_in(&self, file: &Path) -> ToolResult<Vec<Declaration>>;
}

/// A declaration node owned by the graph for the lifetime of one run.
#[derive(Debug)]
pub struct RefEntity {
    pub id: EntityId,
    pub name: String,
    pub kind: DeclKind,
    pub location: Location,
    pub out_refs: Vec<EntityId>,
    pub in_refs: Vec<EntityId>,
    pub entry_point: bool,
}

/// The cross-reference graph. Rebuilt per run; never mutated after build.
pub struct RefGraph {
    entities: Vec<RefEntity>,
    by_name: HashMap<String, EntityId>,
    reachable: Vec<bool>,
}

impl RefGraph {
    /// Run the full declaration pass over `scope` and assemble the graph.
    ///
    /// Extraction runs file-parallel; id assignment is deterministic (files
    /// sorted, declaration order preserved). Any provider failure fails the
    /// build: dependent tools cannot produce meaningful results on a partial
    /// graph. `should_continue` is polled at file granularity.
    pub fn build(
        scope: &dyn AnalysisScope,
        provider: &dyn DeclarationProvider,
        should_continue: &(dyn Fn() -> bool + Sync),
    ) -> Result<RefGraph> {
        let mut files: Vec<PathBuf> = Vec::new();
        for file in scope.enumerate() {
            if !should_continue() {
                return Err(CoreError::GraphBuild("cancelled during scan".to_string()));
            }
            files.push(file);
        }
        files.sort();

        let extracted: Vec<(PathBuf, ToolResult<Vec<Declaration>>)> = files
            .into_par_iter()
            .map(|file| {
                if !should_continue() {
                    return (file, Err(crate::error::ToolError::Failed("cancelled".into())));
                }
                let declarations = provider.declarations_in(&file);
                (file, declarations)
            })
            .collect();

        let mut entities: Vec<RefEntity> = Vec::new();
        let mut by_name: HashMap<String, EntityId> = HashMap::new();
        let mut pending_refs: Vec<Vec<String>> = Vec::new();

        for (file, result) in extracted {
            let declarations = result.map_err(|e| {
                CoreError::GraphBuild(format!("declaration pass failed for {}: {}", file.display(), e))
            })?;
            for decl in declarations {
                let id = entities.len() as EntityId;
                by_name.entry(decl.qualified_name.clone()).or_insert(id);
                entities.push(RefEntity {
                    id,
                    name: decl.qualified_name,
                    kind: decl.kind,
                    location: decl.location,
                    out_refs: Vec::new(),
                    in_refs: Vec::new(),
                    entry_point: decl.entry_point,
                });
                pending_refs.push(decl.references);
            }
        }

        for (from, names) in pending_refs.into_iter().enumerate() {
            let from = from as EntityId;
            for name in names {
                if let Some(&to) = by_name.get(&name) {
                    entities[from as usize].out_refs.push(to);
                    entities[to as usize].in_refs.push(from);
                }
            }
        }

        let reachable = compute_reachability(&entities);

        Ok(RefGraph {
            entities,
            by_name,
            reachable,
        })
    }

    pub fn entity(&self, id: EntityId) -> Option<&RefEntity> {
        self.entities.get(id as usize)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&RefEntity> {
        self.by_name.get(name).and_then(|id| self.entity(*id))
    }

    pub fn entities(&self) -> impl Iterator<Item = &RefEntity> {
        self.entities.iter()
    }

    /// Whether the entity is reachable from any entry point.
    pub fn is_reachable(&self, id: EntityId) -> bool {
        self.reachable.get(id as usize).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// BFS over out-edges from all entry points.
fn compute_reachability(entities: &[RefEntity]) -> Vec<bool> {
    let mut reachable = vec![false; entities.len()];
    let mut queue: VecDeque<EntityId> = entities
        .iter()
        .filter(|e| e.entry_point)
        .map(|e| e.id)
        .collect();

    for id in &queue {
        reachable[*id as usize] = true;
    }

    while let Some(id) = queue.pop_front() {
        for &next in &entities[id as usize].out_refs {
            if !reachable[next as usize] {
                reachable[next as usize] = true;
                queue.push_back(next);
            }
        }
    }

    reachable
}

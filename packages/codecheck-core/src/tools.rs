//! Per-tool ordered state lists: one default state plus scoped overrides.
//!
//! Resolution is first-match-in-insertion-order. Callers control priority
//! purely through list position (`prepend_state`/`append_state`/
//! `move_scope`); there is no "most specific scope wins" rule.

use crate::descriptor::{ToolHandle, ToolId};
use crate::error::{CoreError, Result};
use crate::scope::NamedScope;
use crate::severity::Severity;
use std::path::Path;
use std::sync::Arc;

/// One configured variant of a tool: (scope-or-default, instance, enabled,
/// severity).
#[derive(Debug, Clone)]
pub struct ScopeToolState {
    /// `None` is the default/all scope, always matching, ordered last.
    pub scope: Option<Arc<NamedScope>>,
    pub tool: ToolHandle,
    pub enabled: bool,
    pub level: Severity,
}

impl ScopeToolState {
    pub fn new(scope: Option<Arc<NamedScope>>, tool: ToolHandle, enabled: bool, level: Severity) -> Self {
        Self {
            scope,
            tool,
            enabled,
            level,
        }
    }

    pub fn scope_name(&self) -> Option<&str> {
        self.scope.as_deref().map(NamedScope::name)
    }

    fn matches(&self, file: &Path) -> bool {
        match &self.scope {
            Some(scope) => scope.contains(file),
            None => true,
        }
    }
}

/// All states for one tool identity inside a profile.
///
/// Invariant: the default state always exists and is the fallback when no
/// scoped state matches or when no file is given. The aggregate `enabled`
/// flag ("could any state fire") is distinct from each state's own flag.
#[derive(Debug, Clone)]
pub struct ToolStateSet {
    tool_id: ToolId,
    scoped: Vec<ScopeToolState>,
    default_state: ScopeToolState,
    enabled: bool,
}

impl ToolStateSet {
    pub fn new(tool_id: impl Into<ToolId>, default_state: ScopeToolState, enabled: bool) -> Self {
        debug_assert!(default_state.scope.is_none());
        Self {
            tool_id: tool_id.into(),
            scoped: Vec::new(),
            default_state,
            enabled,
        }
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    /// Aggregate flag: whether any state of this tool could fire.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_state(&self) -> &ScopeToolState {
        &self.default_state
    }

    /// All states in resolution order: scoped states first, default last.
    pub fn states(&self) -> impl Iterator<Item = &ScopeToolState> {
        self.scoped.iter().chain(std::iter::once(&self.default_state))
    }

    pub fn scoped_states(&self) -> &[ScopeToolState] {
        &self.scoped
    }

    /// Resolve the state for a file, or the first state when none is given.
    ///
    /// First match in insertion order wins; the default state is the
    /// fallback.
    pub fn resolve(&self, file: Option<&Path>) -> &ScopeToolState {
        match file {
            None => self.scoped.first().unwrap_or(&self.default_state),
            Some(file) => self
                .scoped
                .iter()
                .find(|state| state.matches(file))
                .unwrap_or(&self.default_state),
        }
    }

    /// The enabled tool instance applicable to `file`, if any.
    pub fn tool_for(&self, file: Option<&Path>) -> Option<&ToolHandle> {
        if !self.enabled {
            return None;
        }
        let state = self.resolve(file);
        state.enabled.then_some(&state.tool)
    }

    pub fn is_enabled_for(&self, file: Option<&Path>) -> bool {
        self.tool_for(file).is_some()
    }

    pub fn severity_for(&self, file: Option<&Path>) -> Severity {
        self.resolve(file).level
    }

    /// Flip the aggregate flag. With no scoped states the default state's
    /// flag follows; once scoped states exist the default flag is
    /// independent. Disabling always forces the aggregate off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if self.scoped.is_empty() {
            self.default_state.enabled = enabled;
        }
    }

    /// Enable the first state matching `file` (default state when none
    /// matches). The aggregate flag becomes true: some state can now fire.
    pub fn enable_for(&mut self, file: &Path) {
        self.resolve_mut(file).enabled = true;
        self.enabled = true;
    }

    /// Disable only the first state matching `file`; other states keep
    /// their flags. The aggregate flag is recomputed as an OR.
    pub fn disable_for(&mut self, file: &Path) {
        self.resolve_mut(file).enabled = false;
        self.recompute_aggregate();
    }

    fn resolve_mut(&mut self, file: &Path) -> &mut ScopeToolState {
        let index = self.scoped.iter().position(|state| state.matches(file));
        match index {
            Some(i) => &mut self.scoped[i],
            None => &mut self.default_state,
        }
    }

    fn recompute_aggregate(&mut self) {
        self.enabled =
            self.default_state.enabled || self.scoped.iter().any(|state| state.enabled);
    }

    /// Append a scoped state at the end of the scan order (still before the
    /// default fallback).
    pub fn append_state(&mut self, state: ScopeToolState) {
        debug_assert!(state.scope.is_some());
        if state.enabled {
            self.enabled = true;
        }
        self.scoped.push(state);
    }

    /// Insert a scoped state at the head of the scan order.
    pub fn prepend_state(&mut self, state: ScopeToolState) {
        debug_assert!(state.scope.is_some());
        if state.enabled {
            self.enabled = true;
        }
        self.scoped.insert(0, state);
    }

    /// Reorder a scoped state; `from`/`to` index the scoped list.
    pub fn move_scope(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= self.scoped.len() {
            return Err(CoreError::InvalidStatePosition(from));
        }
        if to >= self.scoped.len() {
            return Err(CoreError::InvalidStatePosition(to));
        }
        let state = self.scoped.remove(from);
        self.scoped.insert(to, state);
        Ok(())
    }

    pub fn remove_scope(&mut self, scope_name: &str) -> Option<ScopeToolState> {
        let index = self
            .scoped
            .iter()
            .position(|state| state.scope_name() == Some(scope_name))?;
        let removed = self.scoped.remove(index);
        self.recompute_aggregate();
        Some(removed)
    }

    /// Set the severity of the named scoped state, or of the default state
    /// when `scope_name` is `None`.
    pub fn set_level(&mut self, scope_name: Option<&str>, level: Severity) -> Result<()> {
        match scope_name {
            None => {
                self.default_state.level = level;
                Ok(())
            }
            Some(name) => {
                let state = self
                    .scoped
                    .iter_mut()
                    .find(|state| state.scope_name() == Some(name))
                    .ok_or_else(|| CoreError::UnknownScope(name.to_string()))?;
                state.level = level;
                Ok(())
            }
        }
    }

    /// Structural comparison used by profile diffing: same state count, and
    /// per state the same scope name, enabled flag, level, and settings.
    pub fn structurally_equals(&self, other: &ToolStateSet) -> bool {
        if self.enabled != other.enabled || self.scoped.len() != other.scoped.len() {
            return false;
        }
        self.states()
            .zip(other.states())
            .all(|(a, b)| {
                a.scope_name() == b.scope_name()
                    && a.enabled == b.enabled
                    && a.level == b.level
                    && a.tool.settings == b.tool.settings
            })
    }
}

//! Profiles: named collections of tool state sets, optionally derived from a
//! base profile.
//!
//! A profile is populated once, lazily, from a tool registry; the first
//! initializer blocks concurrent callers until done and the work never runs
//! twice. During an analysis run the profile is treated as read-only.

use crate::descriptor::{ToolHandle, ToolId};
use crate::error::{CoreError, Result};
use crate::profile_data::{ProfileData, ScopeData, ToolData};
use crate::registry::ToolRegistry;
use crate::scope::{NamedScope, ScopeSet};
use crate::severity::{Severity, SeverityRegistrar};
use crate::tools::{ScopeToolState, ToolStateSet};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Externally supplied per-tool override fragment, resolved against a scope
/// set at construction so initialization itself cannot fail.
#[derive(Debug, Clone)]
struct ToolOverride {
    enabled: bool,
    level: Severity,
    settings: Value,
    scopes: Vec<ScopeOverride>,
}

#[derive(Debug, Clone)]
struct ScopeOverride {
    scope: Arc<NamedScope>,
    enabled: bool,
    level: Severity,
    settings: Value,
}

#[derive(Default)]
struct ProfileState {
    tools: HashMap<ToolId, ToolStateSet>,
    initialized: bool,
    /// Memoized `is_proper_setting` answers; invalidated on structural
    /// change.
    diff_cache: HashMap<ToolId, bool>,
}

pub struct Profile {
    name: String,
    version: String,
    base: Option<Arc<Profile>>,
    /// Locked profiles force every aggregate-enabled flag to false.
    locked: bool,
    overrides: HashMap<ToolId, ToolOverride>,
    state: RwLock<ProfileState>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0".to_string(),
            base: None,
            locked: false,
            overrides: HashMap::new(),
            state: RwLock::new(ProfileState::default()),
        }
    }

    pub fn with_base(name: impl Into<String>, base: Arc<Profile>) -> Self {
        let mut profile = Self::new(name);
        profile.base = Some(base);
        profile
    }

    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Build a profile carrying override fragments from persisted data.
    /// Scope names are resolved eagerly; an unknown name fails here, not
    /// during initialization.
    pub fn from_data(data: &ProfileData, scopes: &ScopeSet) -> Result<Self> {
        let mut profile = Self::new(data.name.clone());
        profile.version = data.version.clone();
        profile.locked = data.locked;
        for tool in &data.tools {
            profile
                .overrides
                .insert(tool.id.clone(), resolve_override(tool, scopes)?);
        }
        Ok(profile)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn base(&self) -> Option<&Arc<Profile>> {
        self.base.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// One-time population from the registry. Idempotent and thread-safe:
    /// the write lock blocks concurrent callers while the first one works,
    /// and the double check keeps the work from running twice.
    pub fn initialize(&self, registry: &dyn ToolRegistry, registrar: &SeverityRegistrar) {
        if self.state.read().initialized {
            return;
        }
        if let Some(base) = &self.base {
            base.initialize(registry, registrar);
        }
        let mut state = self.state.write();
        if state.initialized {
            return;
        }

        for descriptor in registry.create_all() {
            let key = registrar.register(&descriptor.id);
            let mut handle = ToolHandle::new(descriptor.clone(), key);

            let mut enabled = descriptor.enabled_by_default;
            let mut level = descriptor.default_severity;
            if let Some(base) = &self.base {
                if let Some((base_enabled, base_level, base_settings)) =
                    base.default_seed(&descriptor.id)
                {
                    enabled = base_enabled;
                    level = base_level;
                    handle.settings = base_settings;
                }
            }

            let mut set = match self.overrides.get(&descriptor.id) {
                None => {
                    let default_state = ScopeToolState::new(None, handle, enabled, level);
                    ToolStateSet::new(descriptor.id.clone(), default_state, enabled)
                }
                Some(fragment) => {
                    let mut default_handle = handle.clone();
                    if !fragment.settings.is_null() {
                        default_handle.settings = fragment.settings.clone();
                    }
                    let default_state = ScopeToolState::new(
                        None,
                        default_handle,
                        fragment.enabled,
                        fragment.level,
                    );
                    let mut set =
                        ToolStateSet::new(descriptor.id.clone(), default_state, fragment.enabled);
                    for scoped in &fragment.scopes {
                        let mut scoped_handle = handle.clone();
                        if !scoped.settings.is_null() {
                            scoped_handle.settings = scoped.settings.clone();
                        }
                        set.append_state(ScopeToolState::new(
                            Some(scoped.scope.clone()),
                            scoped_handle,
                            scoped.enabled,
                            scoped.level,
                        ));
                    }
                    set
                }
            };

            if self.locked {
                set.set_enabled(false);
            }
            state.tools.insert(descriptor.id.clone(), set);
        }

        state.initialized = true;
        tracing::debug!(
            "profile '{}' initialized with {} tools",
            self.name,
            state.tools.len()
        );
    }

    /// Seed values a derived profile takes for a tool: aggregate enabled,
    /// default level, default settings.
    fn default_seed(&self, tool_id: &str) -> Option<(bool, Severity, Value)> {
        let state = self.state.read();
        let set = state.tools.get(tool_id)?;
        let default = set.default_state();
        Some((set.is_enabled(), default.level, default.tool.settings.clone()))
    }

    /// The enabled tool instance for `tool_id` applicable to `file`, if any.
    pub fn tool_for(&self, tool_id: &str, file: Option<&Path>) -> Option<ToolHandle> {
        let state = self.state.read();
        if !state.initialized {
            tracing::warn!("profile '{}' queried before initialization", self.name);
            return None;
        }
        state.tools.get(tool_id)?.tool_for(file).cloned()
    }

    pub fn is_tool_enabled(&self, tool_id: &str, file: Option<&Path>) -> bool {
        self.tool_for(tool_id, file).is_some()
    }

    pub fn severity_of(&self, tool_id: &str, file: Option<&Path>) -> Option<Severity> {
        let state = self.state.read();
        Some(state.tools.get(tool_id)?.severity_for(file))
    }

    /// All tool ids, sorted for deterministic iteration.
    pub fn tool_ids(&self) -> Vec<ToolId> {
        let state = self.state.read();
        let mut ids: Vec<ToolId> = state.tools.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Deep snapshot of every tool state set, sorted by tool id. Runs
    /// resolve against the snapshot so the profile stays untouched and
    /// unlocked for their whole duration.
    pub fn tools_snapshot(&self) -> Vec<ToolStateSet> {
        let state = self.state.read();
        let mut sets: Vec<ToolStateSet> = state.tools.values().cloned().collect();
        sets.sort_by(|a, b| a.tool_id().cmp(b.tool_id()));
        sets
    }

    pub fn with_tool<R>(&self, tool_id: &str, f: impl FnOnce(&ToolStateSet) -> R) -> Result<R> {
        let state = self.state.read();
        let set = state
            .tools
            .get(tool_id)
            .ok_or_else(|| CoreError::UnknownTool(tool_id.to_string()))?;
        Ok(f(set))
    }

    /// Structural mutation entry point; drops the memoized diff answer for
    /// the tool.
    pub fn modify_tool<R>(
        &self,
        tool_id: &str,
        f: impl FnOnce(&mut ToolStateSet) -> R,
    ) -> Result<R> {
        let mut state = self.state.write();
        state.diff_cache.remove(tool_id);
        let set = state
            .tools
            .get_mut(tool_id)
            .ok_or_else(|| CoreError::UnknownTool(tool_id.to_string()))?;
        Ok(f(set))
    }

    pub fn set_tool_enabled(&self, tool_id: &str, enabled: bool) -> Result<()> {
        self.modify_tool(tool_id, |set| set.set_enabled(enabled))
    }

    pub fn enable_tool_for(&self, tool_id: &str, file: &Path) -> Result<()> {
        self.modify_tool(tool_id, |set| set.enable_for(file))
    }

    pub fn disable_tool_for(&self, tool_id: &str, file: &Path) -> Result<()> {
        self.modify_tool(tool_id, |set| set.disable_for(file))
    }

    pub fn set_severity(
        &self,
        tool_id: &str,
        scope_name: Option<&str>,
        level: Severity,
    ) -> Result<()> {
        self.modify_tool(tool_id, |set| set.set_level(scope_name, level))?
    }

    pub fn add_scope_state(&self, tool_id: &str, state: ScopeToolState) -> Result<()> {
        self.modify_tool(tool_id, |set| set.append_state(state))
    }

    /// True iff this profile's state set for the tool differs structurally
    /// from the base profile's. Memoized; profiles without a base report
    /// false.
    pub fn is_proper_setting(&self, tool_id: &str) -> bool {
        let Some(base) = &self.base else {
            return false;
        };
        if let Some(&cached) = self.state.read().diff_cache.get(tool_id) {
            return cached;
        }

        let differs = {
            let mine = self.state.read();
            let theirs = base.state.read();
            match (mine.tools.get(tool_id), theirs.tools.get(tool_id)) {
                (Some(a), Some(b)) => !a.structurally_equals(b),
                (None, None) => false,
                _ => true,
            }
        };

        self.state
            .write()
            .diff_cache
            .insert(tool_id.to_string(), differs);
        differs
    }

    /// Atomically replace this profile's tool map from a modified copy.
    /// Last-writer-wins; no merge.
    pub fn commit(&self, modified: &Profile) {
        if std::ptr::eq(self, modified) {
            return;
        }
        let (tools, initialized) = {
            let source = modified.state.read();
            (source.tools.clone(), source.initialized)
        };
        {
            let mut state = self.state.write();
            state.tools = tools;
            state.initialized = state.initialized || initialized;
            state.diff_cache.clear();
        }
        modified.state.write().diff_cache.clear();
    }

    /// Deep copy: tool state sets are cloned (settings included), never
    /// shared. A copy of an uninitialized profile defers population to its
    /// own first use.
    pub fn copy(&self) -> Profile {
        let state = self.state.read();
        Profile {
            name: self.name.clone(),
            version: self.version.clone(),
            base: self.base.clone(),
            locked: self.locked,
            overrides: self.overrides.clone(),
            state: RwLock::new(ProfileState {
                tools: state.tools.clone(),
                initialized: state.initialized,
                diff_cache: HashMap::new(),
            }),
        }
    }

    /// Export the current state in the persisted logical shape.
    pub fn to_data(&self) -> ProfileData {
        let state = self.state.read();
        let mut sets: Vec<(&ToolId, &ToolStateSet)> = state.tools.iter().collect();
        sets.sort_by(|a, b| a.0.cmp(b.0));

        let tools = sets
            .into_iter()
            .map(|(id, set)| {
                let default = set.default_state();
                ToolData {
                    id: (*id).clone(),
                    enabled: set.is_enabled(),
                    level: default.level,
                    settings: default.tool.settings.clone(),
                    scopes: set
                        .scoped_states()
                        .iter()
                        .map(|s| ScopeData {
                            scope_name: s.scope_name().unwrap_or_default().to_string(),
                            enabled: s.enabled,
                            level: s.level,
                            settings: s.tool.settings.clone(),
                        })
                        .collect(),
                }
            })
            .collect();

        ProfileData {
            name: self.name.clone(),
            version: self.version.clone(),
            locked: self.locked,
            tools,
        }
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("locked", &self.locked)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

fn resolve_override(tool: &ToolData, scopes: &ScopeSet) -> Result<ToolOverride> {
    let mut resolved = Vec::with_capacity(tool.scopes.len());
    for scoped in &tool.scopes {
        resolved.push(ScopeOverride {
            scope: scopes.resolve(&scoped.scope_name)?,
            enabled: scoped.enabled,
            level: scoped.level,
            settings: scoped.settings.clone(),
        });
    }
    Ok(ToolOverride {
        enabled: tool.enabled,
        level: tool.level,
        settings: tool.settings.clone(),
        scopes: resolved,
    })
}

//! Tool descriptors: shared metadata plus a tagged capability variant.
//!
//! One analysis tool is one `ToolDescriptor`. What kind of pass it runs is a
//! `ToolCapability` matched on at dispatch sites; there is no wrapper
//! hierarchy.

use crate::analysis::AnalysisScope;
use crate::error::ToolResult;
use crate::problem::{EntityKey, ProblemDescriptor};
use crate::refgraph::RefGraph;
use crate::severity::{HighlightKey, Severity};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Stable short name of a tool, unique within a profile.
pub type ToolId = String;

/// A tool that analyzes one file in isolation.
pub trait LocalTool: Send + Sync {
    /// Analyze a single file. `batch` tells the tool whether it runs over a
    /// whole scope or a single file.
    fn check_file(
        &self,
        file: &Path,
        settings: &Value,
        batch: bool,
    ) -> ToolResult<Vec<ProblemDescriptor>>;

    /// Annotator-style tools run a deferred collect step after `check_file`.
    fn has_deferred_pass(&self) -> bool {
        false
    }

    fn collect_deferred(&self, _file: &Path, _settings: &Value) -> ToolResult<Vec<ProblemDescriptor>> {
        Ok(Vec::new())
    }
}

/// A tool that analyzes across a whole scope, optionally over the reference
/// graph.
pub trait GlobalTool: Send + Sync {
    /// Whether the run must build the reference graph before this tool runs.
    fn needs_reference_graph(&self) -> bool {
        false
    }

    fn check_scope(
        &self,
        scope: &dyn AnalysisScope,
        graph: Option<&RefGraph>,
        settings: &Value,
    ) -> ToolResult<Vec<(EntityKey, Vec<ProblemDescriptor>)>>;

    /// Whether findings may depend on usages outside the analyzed scope.
    /// When true and the scope is not the whole project, the orchestrator
    /// schedules a second pass via [`GlobalTool::check_external_usages`].
    fn may_have_external_usages(&self) -> bool {
        false
    }

    fn check_external_usages(
        &self,
        _scope: &dyn AnalysisScope,
        _graph: Option<&RefGraph>,
        _settings: &Value,
    ) -> ToolResult<Vec<(EntityKey, Vec<ProblemDescriptor>)>> {
        Ok(Vec::new())
    }
}

/// What kind of pass a tool runs.
///
/// `GlobalSimple` is a global tool with no cross-file state: it is executed
/// file-by-file inside the local pipeline.
pub enum ToolCapability {
    Local(Arc<dyn LocalTool>),
    Global(Arc<dyn GlobalTool>),
    GlobalSimple(Arc<dyn LocalTool>),
}

impl ToolCapability {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolCapability::Local(_) => "local",
            ToolCapability::Global(_) => "global",
            ToolCapability::GlobalSimple(_) => "global-simple",
        }
    }

    /// The per-file check, for capabilities executed in the local pipeline.
    pub fn local_tool(&self) -> Option<&Arc<dyn LocalTool>> {
        match self {
            ToolCapability::Local(tool) | ToolCapability::GlobalSimple(tool) => Some(tool),
            ToolCapability::Global(_) => None,
        }
    }

    pub fn global_tool(&self) -> Option<&Arc<dyn GlobalTool>> {
        match self {
            ToolCapability::Global(tool) => Some(tool),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ToolCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ToolCapability::{}", self.kind())
    }
}

/// Immutable description of one registered tool.
#[derive(Debug)]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub display_name: String,
    pub group: String,
    pub default_severity: Severity,
    pub enabled_by_default: bool,
    /// Tagged as able to participate in batch cleanup.
    pub cleanup_capable: bool,
    /// Tools that must run alongside this one during cleanup discovery.
    pub dependent_tools: Vec<ToolId>,
    /// Suppression comments may reference the tool under this id too.
    pub alternative_id: Option<String>,
    pub default_settings: Value,
    pub capability: ToolCapability,
}

impl ToolDescriptor {
    pub fn new(id: impl Into<ToolId>, capability: ToolCapability) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            group: "General".to_string(),
            default_severity: Severity::Warning,
            enabled_by_default: true,
            cleanup_capable: false,
            dependent_tools: Vec::new(),
            alternative_id: None,
            default_settings: Value::Null,
            capability,
            id,
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn default_severity(mut self, level: Severity) -> Self {
        self.default_severity = level;
        self
    }

    pub fn enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_by_default = enabled;
        self
    }

    pub fn cleanup_capable(mut self, cleanup: bool) -> Self {
        self.cleanup_capable = cleanup;
        self
    }

    pub fn dependent_tools(mut self, ids: Vec<ToolId>) -> Self {
        self.dependent_tools = ids;
        self
    }

    pub fn alternative_id(mut self, id: impl Into<String>) -> Self {
        self.alternative_id = Some(id.into());
        self
    }

    pub fn default_settings(mut self, settings: Value) -> Self {
        self.default_settings = settings;
        self
    }

    /// Whether the tool participates in the local (per-file) pipeline.
    pub fn runs_locally(&self) -> bool {
        self.capability.local_tool().is_some()
    }
}

/// A configured instance of a tool inside one profile state.
///
/// Cloning deep-copies `settings`; profile copies never share mutable tool
/// configuration. The descriptor itself is immutable and shared.
#[derive(Debug, Clone)]
pub struct ToolHandle {
    pub descriptor: Arc<ToolDescriptor>,
    pub settings: Value,
    pub highlight_key: HighlightKey,
}

impl ToolHandle {
    pub fn new(descriptor: Arc<ToolDescriptor>, highlight_key: HighlightKey) -> Self {
        let settings = descriptor.default_settings.clone();
        Self {
            descriptor,
            settings,
            highlight_key,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn capability(&self) -> &ToolCapability {
        &self.descriptor.capability
    }
}

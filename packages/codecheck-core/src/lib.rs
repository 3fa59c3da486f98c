/*
 * Codecheck Core - Analysis Engine Domain Model
 *
 * Profiles, scopes, tool state sets, problem descriptors, and the
 * declaration cross-reference graph. The orchestration crate drives these
 * over an analysis scope; concrete rule logic, persistence containers, and
 * rendering live with the embedder.
 */

// Public modules
pub mod analysis;
pub mod descriptor;
pub mod error;
pub mod problem;
pub mod profile;
pub mod profile_data;
pub mod refgraph;
pub mod registry;
pub mod scope;
pub mod severity;
pub mod tools;

// Re-exports
pub use analysis::{AnalysisScope, FileListScope, FileOracle, FsAnalysisScope, FsFileOracle};
pub use descriptor::{
    GlobalTool, LocalTool, ToolCapability, ToolDescriptor, ToolHandle, ToolId,
};
pub use error::{CoreError, Result, ToolError, ToolResult};
pub use problem::{
    EntityKey, Location, ProblemDescriptor, ProblemKey, QuickFix, TextEdit, TextRange,
};
pub use profile::Profile;
pub use profile_data::{ProfileData, ScopeData, ToolData};
pub use refgraph::{DeclKind, Declaration, DeclarationProvider, EntityId, RefEntity, RefGraph};
pub use registry::{StaticToolRegistry, ToolRegistry};
pub use scope::{NamedScope, ScopeSet};
pub use severity::{HighlightKey, Severity, SeverityRegistrar};
pub use tools::{ScopeToolState, ToolStateSet};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown scope: {0}")]
    UnknownScope(String),

    #[error("Invalid scope pattern: {0}")]
    InvalidScopePattern(String),

    #[error("Invalid severity: {0}")]
    InvalidSeverity(String),

    #[error("Profile not initialized: {0}")]
    ProfileNotInitialized(String),

    #[error("Invalid state position: {0}")]
    InvalidStatePosition(usize),

    #[error("Reference graph build failed: {0}")]
    GraphBuild(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure raised by a single tool while analyzing one file or one scope.
///
/// Isolated by the orchestrator: logged, that tool/target pairing yields no
/// additional problems, everything else proceeds.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;

impl ToolError {
    pub fn failed<E: std::fmt::Display>(e: E) -> Self {
        Self::Failed(e.to_string())
    }
}

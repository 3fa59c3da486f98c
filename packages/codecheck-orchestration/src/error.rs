use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Cooperative cancellation. Not a failure: it aborts the in-flight
    /// phase and leaves already-aggregated results valid.
    #[error("Run cancelled")]
    Cancelled,

    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Fatal to the run: tools depending on the reference graph cannot
    /// produce meaningful results without it.
    #[error("Reference graph build failed: {0}")]
    GraphBuild(String),

    #[error("Fix application failed: {0}")]
    FixApplication(String),

    #[error("Core error: {0}")]
    Core(#[from] codecheck_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn precondition<E: std::fmt::Display>(e: E) -> Self {
        Self::Precondition(e.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestratorError::Cancelled)
    }
}

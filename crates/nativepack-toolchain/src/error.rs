//! Toolchain error types.

/// Errors raised by toolchain operations.
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    /// One or more required tools are not on `PATH`.
    #[error("required tools not found: {}", tools.join(", "))]
    MissingTools { tools: Vec<String> },

    /// A tool exists but could not be started.
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// A tool ran and exited unsuccessfully. `diagnostic` is its raw output.
    #[error("{tool} exited with status {status}: {diagnostic}")]
    ToolFailed {
        tool: String,
        status: i32,
        diagnostic: String,
    },

    /// A tool succeeded but printed something we could not interpret.
    #[error("unexpected output from {tool}: {detail}")]
    UnexpectedOutput { tool: String, detail: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed mock binary.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolchainError {
    /// Raw diagnostic text, when the failure came from a tool run.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::ToolFailed { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}

/// Result type alias for toolchain operations.
pub type Result<T> = std::result::Result<T, ToolchainError>;

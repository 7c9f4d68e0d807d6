//! Pipeline errors.

use nativepack_toolchain::ToolchainError;
use thiserror::Error;

use crate::bundle::AssemblyFailure;
use crate::verify::CheckKind;

/// Errors that can occur during a pipeline run.
///
/// Every variant is fatal to the run. [`PipelineError::kind`] names the error
/// class for reports and exit diagnostics.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("environment check failed: {detail}")]
    Environment { detail: String },

    #[error("source acquisition failed: {detail}")]
    Source { detail: String },

    #[error("compilation failed for {target}: {diagnostic}")]
    Compilation { target: String, diagnostic: String },

    #[error("inconsistent architecture slices for {target}: {detail}")]
    Consistency { target: String, detail: String },

    #[error("{}", format_assembly(.failures))]
    Assembly { failures: Vec<AssemblyFailure> },

    #[error("packaging failed: {detail}")]
    Packaging { detail: String },

    #[error("verification failed: {check} check failed for {target}: {detail}")]
    Verification {
        check: CheckKind,
        target: String,
        detail: String,
    },

    #[error("invalid configuration: {detail}")]
    Config { detail: String },

    #[error("toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_assembly(failures: &[AssemblyFailure]) -> String {
    match failures {
        [] => "bundle assembly failed".to_string(),
        [only] => format!("bundle assembly failed: {only}"),
        [first, rest @ ..] => format!(
            "bundle assembly failed for {} targets: {first} (and {} more)",
            rest.len() + 1,
            rest.len()
        ),
    }
}

impl PipelineError {
    /// Error class name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Environment { .. } => "EnvironmentError",
            Self::Source { .. } => "SourceError",
            Self::Compilation { .. } => "CompilationError",
            Self::Consistency { .. } => "ConsistencyError",
            Self::Assembly { .. } => "AssemblyError",
            Self::Packaging { .. } => "PackagingError",
            Self::Verification { .. } => "VerificationError",
            Self::Config { .. } => "ConfigError",
            Self::Toolchain(_) | Self::Io(_) | Self::Json(_) => "InternalError",
        }
    }

    /// Target the failure is attributed to, when there is exactly one.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Compilation { target, .. }
            | Self::Consistency { target, .. }
            | Self::Verification { target, .. } => Some(target),
            Self::Assembly { failures } if failures.len() == 1 => Some(&failures[0].target),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

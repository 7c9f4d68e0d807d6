//! Error types for target definitions.

use std::path::PathBuf;

/// Errors that can occur while loading or constructing platform targets.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// I/O error reading/writing target files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Target file not found.
    #[error("target file not found: {}", path.display())]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// An OS family name that nativepack does not know.
    #[error("unknown OS family '{name}'")]
    UnknownOs {
        /// The rejected name.
        name: String,
    },

    /// An architecture name that nativepack does not know.
    #[error("unknown architecture '{name}'")]
    UnknownArch {
        /// The rejected name.
        name: String,
    },

    /// Validation error in a target definition.
    #[error("validation error: {detail}")]
    Validation {
        /// Description of the validation failure.
        detail: String,
    },
}

/// Result type for target operations.
pub type Result<T> = std::result::Result<T, TargetError>;

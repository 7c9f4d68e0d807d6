//! Resolution errors.

use crate::host::HostPlatform;

/// Errors raised while choosing, opening or querying the native library.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The strategy table has no entry for this host. Nothing was opened.
    #[error("no load strategy for host platform '{host}'")]
    UnsupportedPlatform { host: HostPlatform },

    /// The chosen strategy could not open its library.
    #[error("failed to open {strategy}: {reason}")]
    OpenFailed { strategy: String, reason: String },

    /// A routine is not present in the resolved library.
    #[error("symbol '{symbol}' not found: {reason}")]
    SymbolNotFound { symbol: String, reason: String },
}

/// Result type alias for resolution.
pub type Result<T> = std::result::Result<T, ResolutionError>;

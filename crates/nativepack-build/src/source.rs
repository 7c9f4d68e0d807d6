//! Source acquisition at a pinned reference.

use std::path::PathBuf;

use nativepack_toolchain::{SourcePin, Toolchain};
use tracing::info;

use crate::error::{PipelineError, Result};

/// Where the library sources live and, optionally, where they come from.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Source tree containing `CMakeLists.txt`.
    pub dir: PathBuf,
    /// Repository and tag/commit to clone when `dir` is absent.
    pub pin: Option<SourcePin>,
}

/// Make sure the source tree is present.
///
/// With a pin: clones when the directory is missing (if `fetch` allows it),
/// otherwise reads back the checked-out commit. Without a pin the directory
/// must already exist and no revision is recorded.
pub fn ensure_source(
    toolchain: &dyn Toolchain,
    config: &SourceConfig,
    fetch: bool,
) -> Result<Option<String>> {
    let Some(pin) = &config.pin else {
        if !config.dir.is_dir() {
            return Err(PipelineError::Source {
                detail: format!("source directory {} does not exist", config.dir.display()),
            });
        }
        return Ok(None);
    };

    if pin.is_floating() {
        return Err(PipelineError::Source {
            detail: format!(
                "reference '{}' is a moving branch; pin a tag or commit",
                pin.reference
            ),
        });
    }

    if config.dir.is_dir() {
        let revision = toolchain
            .source_revision(&config.dir)
            .map_err(|e| PipelineError::Source {
                detail: format!("{}: {e}", config.dir.display()),
            })?;
        return Ok(Some(revision));
    }

    if !fetch {
        return Err(PipelineError::Source {
            detail: format!(
                "source directory {} is missing and fetching is disabled",
                config.dir.display()
            ),
        });
    }

    let revision = toolchain
        .fetch_source(pin, &config.dir)
        .map_err(|e| PipelineError::Source {
            detail: format!("cloning {} at {}: {e}", pin.repository, pin.reference),
        })?;
    info!(repository = %pin.repository, reference = %pin.reference, %revision, "fetched sources");
    Ok(Some(revision))
}

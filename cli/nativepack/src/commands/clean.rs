//! `nativepack clean`: remove build artifacts.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::manifest::{DEFAULT_OUT_DIR, WORK_DIR};

/// Remove the scratch directory and the output directory.
pub fn run(project_dir: &Path, out_dir: Option<&Path>) -> Result<()> {
    let out_dir = project_dir.join(out_dir.unwrap_or(Path::new(DEFAULT_OUT_DIR)));
    for dir in [project_dir.join(WORK_DIR), out_dir] {
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("removing {}", dir.display()))?;
            println!("Removed {}", dir.display());
        } else {
            println!("Already clean: {} does not exist", dir.display());
        }
    }
    Ok(())
}

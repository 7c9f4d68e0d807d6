//! `nativepack init`: project scaffolding.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::manifest::{ProjectManifest, DEFAULT_OUT_DIR, MANIFEST_FILE, WORK_DIR};

/// Create a new packaging project named `name` relative to the working
/// directory.
pub fn run(name: &str) -> Result<()> {
    create_project(Path::new(name), name)
}

pub(crate) fn create_project(project_dir: &Path, name: &str) -> Result<()> {
    if project_dir.exists() {
        bail!("directory '{}' already exists", project_dir.display());
    }

    fs::create_dir_all(project_dir.join("vendor")).context("creating vendor/ directory")?;

    fs::write(
        project_dir.join(MANIFEST_FILE),
        ProjectManifest::template(name),
    )
    .with_context(|| format!("writing {MANIFEST_FILE}"))?;

    fs::write(
        project_dir.join(".gitignore"),
        format!("{WORK_DIR}/\n{DEFAULT_OUT_DIR}/\n"),
    )
    .context("writing .gitignore")?;

    println!("Created project '{name}'");
    println!("  {name}/{MANIFEST_FILE}");
    println!("  {name}/vendor/");
    println!("  {name}/.gitignore");
    println!();
    println!("Place the library sources under vendor/{name} or set [source] repository.");

    Ok(())
}

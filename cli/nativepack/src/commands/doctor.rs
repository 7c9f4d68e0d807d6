//! `nativepack doctor`: toolchain and project diagnostics.

use std::path::Path;

use anyhow::Result;
use nativepack_resolve::{HostPlatform, StrategyTable};
use nativepack_toolchain::SystemToolchain;

use crate::manifest::ProjectManifest;

/// Print toolchain, host and project status.
pub fn run(project_dir: &Path) -> Result<()> {
    println!("=== nativepack Doctor ===");
    println!();
    println!("nativepack version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("--- System Tools ---");
    let mut missing = 0;
    for (tool, path) in SystemToolchain::probe() {
        match path {
            Some(p) => println!("  {tool:<18} {}", p.display()),
            None => {
                missing += 1;
                println!("  {tool:<18} not found");
            }
        }
    }
    if missing > 0 {
        println!("  ({missing} missing; builds need the Xcode command-line tools)");
    }
    println!();

    let host = HostPlatform::current();
    println!("--- Host ---");
    println!("  Platform: {host}");
    println!();

    println!("--- Project Status ---");
    match ProjectManifest::find_and_load(project_dir) {
        Ok(Some((manifest, dir))) => {
            println!("  nativepack.toml: found at {}", dir.display());
            println!(
                "  Library:   {} {} ({}.framework)",
                manifest.library.name,
                manifest.library.version,
                manifest.framework_name()
            );
            let ids: Vec<String> = manifest.targets().iter().map(|t| t.identifier()).collect();
            println!("  Targets:   {}", ids.join(", "));
            let package = manifest.default_package_path(&dir);
            println!(
                "  Package:   {} ({})",
                package.display(),
                if package.is_dir() { "present" } else { "not built" }
            );
            match StrategyTable::for_library(&manifest.library.name).strategy_for(host) {
                Ok(strategy) => println!("  Runtime:   {strategy}"),
                Err(e) => println!("  Runtime:   {e}"),
            }
        }
        Ok(None) => {
            println!("  nativepack.toml: not found");
        }
        Err(e) => {
            println!("  nativepack.toml: error: {e:#}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doctor_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path()).unwrap();
    }

    #[test]
    fn doctor_with_broken_manifest_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nativepack.toml"), "[library\n").unwrap();
        run(dir.path()).unwrap();
    }
}

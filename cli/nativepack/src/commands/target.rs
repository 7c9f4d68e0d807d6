//! `nativepack target`: target listing and description.

use anyhow::{bail, Result};
use nativepack_targets::{builtin_presets, PlatformTarget};

use crate::manifest::ProjectManifest;

/// List the built-in targets and, inside a project, the configured set.
pub fn list(manifest: Option<&ProjectManifest>) -> Result<()> {
    println!("Built-in targets:");
    println!();
    for (target, description) in builtin_presets() {
        println!("  {:<32} {description}", target.identifier());
    }

    if let Some(manifest) = manifest {
        println!();
        println!("Configured for {}:", manifest.framework_name());
        println!();
        for target in manifest.targets() {
            println!(
                "  {:<32} {} {}+",
                target.identifier(),
                target.os(),
                target.min_os_version()
            );
        }
    }

    println!();
    println!("Use 'nativepack target describe <identifier>' for details.");
    Ok(())
}

/// Describe one target, looked up among the configured then built-in targets.
pub fn describe(id: &str, manifest: Option<&ProjectManifest>) -> Result<()> {
    let Some(target) = find_target(id, manifest) else {
        bail!("unknown target: '{id}'. Use 'nativepack target list' to see available targets.");
    };

    let os = target.os();
    println!("=== Target: {} ===", target.identifier());
    println!("OS family:      {os}");
    println!("Minimum OS:     {}", target.min_os_version());
    println!(
        "Architectures:  {}",
        target
            .archs()
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Universal:      {}", if target.is_universal() { "yes" } else { "no" });
    println!("Bundle layout:  {:?}", target.layout());
    println!();

    println!("--- Toolchain ---");
    println!("  CMake system: {}", os.cmake_system_name());
    println!("  SDK:          {}", os.sdk());
    for arch in target.archs() {
        println!(
            "  {:<12}  {}",
            arch.name(),
            os.clang_target(*arch, target.min_os_version())
        );
    }
    println!();

    println!("--- Package Metadata ---");
    println!("  SupportedPlatform:        {}", os.platform());
    println!(
        "  SupportedPlatformVariant: {}",
        os.variant().unwrap_or("(none)")
    );
    Ok(())
}

fn find_target(id: &str, manifest: Option<&ProjectManifest>) -> Option<PlatformTarget> {
    manifest
        .map(ProjectManifest::targets)
        .unwrap_or_default()
        .into_iter()
        .chain(builtin_presets().into_iter().map(|(t, _)| t))
        .find(|t| t.identifier() == id)
}

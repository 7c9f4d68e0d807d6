//! Universal binary merging.

use std::collections::BTreeSet;
use std::path::Path;

use nativepack_targets::{Arch, PlatformTarget};
use nativepack_toolchain::Toolchain;
use tracing::{debug, info};

use crate::artifact::BuildArtifact;
use crate::error::{PipelineError, Result};

fn names(arch_syms: &BTreeSet<String>, other: &BTreeSet<String>) -> String {
    let only: Vec<&str> = arch_syms.difference(other).map(String::as_str).collect();
    if only.is_empty() {
        "-".to_string()
    } else {
        only.join(", ")
    }
}

/// Merge the single-architecture slices of `target` into one binary under
/// `out_dir/<identifier>/`.
///
/// Every slice must export the same symbol set; the check runs before any
/// output is written. A lone slice is copied through unchanged.
pub fn merge_universal(
    toolchain: &dyn Toolchain,
    target: &PlatformTarget,
    slices: &[BuildArtifact],
    out_dir: &Path,
) -> Result<BuildArtifact> {
    let id = target.identifier();
    let consistency = |detail: String| PipelineError::Consistency {
        target: id.clone(),
        detail,
    };

    let Some(first) = slices.first() else {
        return Err(consistency("no slices to merge".into()));
    };

    let mut union = BTreeSet::new();
    for slice in slices {
        for arch in &slice.archs {
            if !union.insert(*arch) {
                return Err(consistency(format!("architecture {arch} appears in more than one slice")));
            }
        }
    }
    if &union != target.archs() {
        let want: Vec<&str> = target.archs().iter().map(Arch::name).collect();
        let got: Vec<&str> = union.iter().map(Arch::name).collect();
        return Err(consistency(format!(
            "slices cover [{}] but the target needs [{}]",
            got.join(", "),
            want.join(", ")
        )));
    }

    let mut reference: Option<(Arch, BTreeSet<String>)> = None;
    for slice in slices {
        for arch in &slice.archs {
            let syms = toolchain.exported_symbols(&slice.path, *arch)?;
            match &reference {
                None => reference = Some((*arch, syms)),
                Some((ref_arch, ref_syms)) if *ref_syms != syms => {
                    return Err(consistency(format!(
                        "{ref_arch} and {arch} export different symbols (only in {ref_arch}: {}; only in {arch}: {})",
                        names(ref_syms, &syms),
                        names(&syms, ref_syms)
                    )));
                }
                Some(_) => {}
            }
        }
    }

    let dest_dir = out_dir.join(&id);
    std::fs::create_dir_all(&dest_dir)?;
    let output = dest_dir.join(first.file_name());

    if slices.len() == 1 {
        debug!(target = %id, "single slice, copying through");
        std::fs::copy(&first.path, &output)?;
    } else {
        let inputs: Vec<_> = slices.iter().map(|s| s.path.clone()).collect();
        toolchain.create_universal(&inputs, &output)?;
    }

    let archs = toolchain.architectures(&output)?;
    if archs != union {
        let got: Vec<&str> = archs.iter().map(Arch::name).collect();
        return Err(consistency(format!(
            "merged binary reports [{}]",
            got.join(", ")
        )));
    }

    let install_name = toolchain.install_name(&output)?;
    info!(target = %id, archs = archs.len(), "merged slices");
    Ok(BuildArtifact {
        target: target.clone(),
        path: output,
        archs,
        install_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_target, CompileConfig};
    use nativepack_targets::OsFamily;
    use nativepack_toolchain::mock::MockToolchain;
    use nativepack_toolchain::Linkage;
    use std::collections::BTreeMap;

    fn slices(tc: &MockToolchain, dir: &Path, target: &PlatformTarget) -> Vec<BuildArtifact> {
        let cfg = CompileConfig {
            library_name: "h3".into(),
            source_dir: dir.join("src"),
            work_dir: dir.join("work"),
            linkage: Linkage::Dynamic,
            defines: BTreeMap::new(),
        };
        compile_target(tc, target, &cfg).unwrap()
    }

    #[test]
    fn merges_two_slices() {
        let dir = tempfile::tempdir().unwrap();
        let tc = MockToolchain::new(["latLngToCell", "cellToLatLng"]);
        let target = PlatformTarget::macos("10.15").unwrap();
        let parts = slices(&tc, dir.path(), &target);

        let merged = merge_universal(&tc, &target, &parts, &dir.path().join("merged")).unwrap();
        assert_eq!(&merged.archs, target.archs());
        assert!(merged.path.ends_with("macos-arm64_x86_64/libh3.dylib"));
        assert_eq!(merged.install_name.as_deref(), Some("@rpath/libh3.dylib"));
    }

    #[test]
    fn single_slice_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let tc = MockToolchain::new(["latLngToCell"]);
        let target = PlatformTarget::ios_device("12.0").unwrap();
        let parts = slices(&tc, dir.path(), &target);

        let merged = merge_universal(&tc, &target, &parts, &dir.path().join("merged")).unwrap();
        assert_eq!(merged.archs, BTreeSet::from([Arch::Arm64]));
        assert_eq!(
            std::fs::read(&merged.path).unwrap(),
            std::fs::read(&parts[0].path).unwrap()
        );
    }

    #[test]
    fn divergent_symbols_fail_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let tc = MockToolchain::new(["latLngToCell", "cellToLatLng"]).with_slice_symbols(
            OsFamily::IosSimulator,
            Arch::X86_64,
            ["latLngToCell"],
        );
        let target = PlatformTarget::ios_simulator("12.0").unwrap();
        let parts = slices(&tc, dir.path(), &target);

        let out = dir.path().join("merged");
        let err = merge_universal(&tc, &target, &parts, &out).unwrap_err();
        match &err {
            PipelineError::Consistency { target, detail } => {
                assert_eq!(target, "ios-arm64_x86_64-simulator");
                assert!(detail.contains("only in arm64: cellToLatLng"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn missing_slice_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let tc = MockToolchain::new(["latLngToCell"]);
        let target = PlatformTarget::macos("10.15").unwrap();
        let parts = slices(&tc, dir.path(), &target);

        let err = merge_universal(&tc, &target, &parts[..1], &dir.path().join("m")).unwrap_err();
        assert_eq!(err.kind(), "ConsistencyError");

        let doubled = vec![parts[0].clone(), parts[0].clone()];
        let err = merge_universal(&tc, &target, &doubled, &dir.path().join("m")).unwrap_err();
        assert!(err.to_string().contains("more than one slice"));
    }
}

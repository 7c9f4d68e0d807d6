//! Framework bundle assembly.

use std::fmt;
use std::path::{Path, PathBuf};

use nativepack_targets::PlatformTarget;
use nativepack_toolchain::{BinaryKind, Toolchain};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use super::layout::FrameworkLayout;
use super::metadata::{module_map, BundleMetadata};
use crate::artifact::BuildArtifact;
use crate::error::{PipelineError, Result};
use crate::fsutil::{copy_headers, remove_dir_if_exists};

/// Named steps of bundle assembly, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssemblyStep {
    Skeleton,
    CopyBinary,
    RewriteSelfReference,
    CopyHeaders,
    WriteMetadata,
    LinkVersions,
    Sign,
}

impl AssemblyStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Skeleton => "skeleton",
            Self::CopyBinary => "copy-binary",
            Self::RewriteSelfReference => "rewrite-self-reference",
            Self::CopyHeaders => "copy-headers",
            Self::WriteMetadata => "write-metadata",
            Self::LinkVersions => "link-versions",
            Self::Sign => "sign",
        }
    }
}

impl fmt::Display for AssemblyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Assembly failure for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyFailure {
    pub target: String,
    pub step: AssemblyStep,
    pub reason: String,
}

impl fmt::Display for AssemblyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at step {}: {}", self.target, self.step, self.reason)
    }
}

/// Public headers to ship.
#[derive(Debug, Clone)]
pub struct HeaderSet {
    /// Directory searched recursively for `.h` files.
    pub dir: PathBuf,
    /// Umbrella header; when set, a module map is generated around it.
    pub umbrella: Option<String>,
}

/// A finished framework bundle for one target.
#[derive(Debug, Clone)]
pub struct FrameworkBundle {
    pub target: PlatformTarget,
    /// `<out>/<identifier>/<Name>.framework`
    pub root: PathBuf,
    pub layout: FrameworkLayout,
    /// Real (non-symlink) path of the binary.
    pub binary: PathBuf,
    /// `None` when the binary is not a dynamic library.
    pub install_name: Option<String>,
}

impl FrameworkBundle {
    pub fn identifier(&self) -> String {
        self.target.identifier()
    }
}

/// Inputs shared by every bundle of a run.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub framework_name: String,
    pub out_dir: PathBuf,
    pub headers: HeaderSet,
    pub metadata: BundleMetadata,
    /// `codesign` identity; `-` signs ad hoc.
    pub signing_identity: String,
}

/// Bundles that assembled and failures of those that did not.
#[derive(Debug, Default)]
pub struct AssemblyOutcome {
    pub bundles: Vec<FrameworkBundle>,
    pub failures: Vec<AssemblyFailure>,
}

impl AssemblyOutcome {
    /// All bundles, or an error listing every failed target.
    pub fn into_result(self) -> Result<Vec<FrameworkBundle>> {
        if self.failures.is_empty() {
            Ok(self.bundles)
        } else {
            Err(PipelineError::Assembly {
                failures: self.failures,
            })
        }
    }
}

/// Assemble the bundle for one merged artifact.
pub fn assemble_bundle(
    toolchain: &dyn Toolchain,
    artifact: &BuildArtifact,
    options: &AssemblyOptions,
) -> std::result::Result<FrameworkBundle, AssemblyFailure> {
    let target = &artifact.target;
    let id = target.identifier();
    let name = options.framework_name.as_str();
    let fail = |step: AssemblyStep, reason: String| AssemblyFailure {
        target: id.clone(),
        step,
        reason,
    };

    let layout = FrameworkLayout::for_target(target);
    let root = options
        .out_dir
        .join(&id)
        .join(format!("{name}.framework"));

    debug!(step = %AssemblyStep::Skeleton, root = %root.display());
    remove_dir_if_exists(&root)
        .and_then(|_| layout.create_skeleton(&root))
        .map_err(|e| fail(AssemblyStep::Skeleton, e.to_string()))?;

    let binary = layout.binary_path(&root, name);
    std::fs::copy(&artifact.path, &binary)
        .map_err(|e| fail(AssemblyStep::CopyBinary, format!("{}: {e}", artifact.path.display())))?;

    let kind = toolchain
        .binary_kind(&binary)
        .map_err(|e| fail(AssemblyStep::RewriteSelfReference, e.to_string()))?;
    let install_name = if kind == BinaryKind::DynamicLibrary {
        let installed = layout
            .rewrite_self_reference(toolchain, &binary, name)
            .map_err(|e| fail(AssemblyStep::RewriteSelfReference, e.to_string()))?;
        Some(installed)
    } else {
        warn!(target = %id, ?kind, "binary is not a dynamic library; leaving install name unset");
        None
    };

    let headers_dir = layout.headers_dir(&root);
    let copied = copy_headers(&options.headers.dir, &headers_dir).map_err(|e| {
        fail(
            AssemblyStep::CopyHeaders,
            format!("{}: {e}", options.headers.dir.display()),
        )
    })?;
    if copied.is_empty() {
        return Err(fail(
            AssemblyStep::CopyHeaders,
            format!("no headers found in {}", options.headers.dir.display()),
        ));
    }
    if let Some(umbrella) = &options.headers.umbrella {
        if !copied.iter().any(|h| h == Path::new(umbrella)) {
            return Err(fail(
                AssemblyStep::CopyHeaders,
                format!("umbrella header {umbrella} is not among the public headers"),
            ));
        }
        let modules = layout.modules_dir(&root);
        std::fs::create_dir_all(&modules)
            .and_then(|_| {
                std::fs::write(modules.join("module.modulemap"), module_map(name, umbrella))
            })
            .map_err(|e| fail(AssemblyStep::CopyHeaders, e.to_string()))?;
    }

    let plist = options.metadata.info_plist(target).to_xml();
    std::fs::write(layout.info_plist_path(&root), plist)
        .map_err(|e| fail(AssemblyStep::WriteMetadata, e.to_string()))?;

    layout
        .link_current(&root, name)
        .map_err(|e| fail(AssemblyStep::LinkVersions, e.to_string()))?;

    toolchain
        .sign(&binary, &options.signing_identity)
        .map_err(|e| fail(AssemblyStep::Sign, e.to_string()))?;

    Ok(FrameworkBundle {
        target: target.clone(),
        root,
        layout,
        binary,
        install_name,
    })
}

/// Assemble a bundle for every artifact. A failing target does not stop the
/// others; its failure is collected in the outcome.
pub fn assemble_all(
    toolchain: &dyn Toolchain,
    artifacts: &[BuildArtifact],
    options: &AssemblyOptions,
) -> AssemblyOutcome {
    let mut outcome = AssemblyOutcome::default();
    for artifact in artifacts {
        let span = info_span!("assemble", target = %artifact.target);
        let _enter = span.enter();
        match assemble_bundle(toolchain, artifact, options) {
            Ok(bundle) => {
                info!(root = %bundle.root.display(), "bundle assembled");
                outcome.bundles.push(bundle);
            }
            Err(failure) => {
                warn!(step = %failure.step, reason = %failure.reason, "bundle assembly failed");
                outcome.failures.push(failure);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_target, CompileConfig};
    use crate::merge::merge_universal;
    use nativepack_toolchain::mock::MockToolchain;
    use nativepack_toolchain::Linkage;
    use std::collections::BTreeMap;

    struct Fixture {
        dir: tempfile::TempDir,
        options: AssemblyOptions,
    }

    fn fixture(umbrella: Option<&str>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let include = dir.path().join("include");
        std::fs::create_dir_all(&include).unwrap();
        std::fs::write(include.join("h3api.h"), "int latLngToCell(void);\n").unwrap();
        let options = AssemblyOptions {
            framework_name: "H3".into(),
            out_dir: dir.path().join("bundles"),
            headers: HeaderSet {
                dir: include,
                umbrella: umbrella.map(str::to_string),
            },
            metadata: BundleMetadata::new("H3", "org.example.h3", "4.1.0"),
            signing_identity: "-".into(),
        };
        Fixture { dir, options }
    }

    fn build(
        tc: &MockToolchain,
        dir: &Path,
        target: &PlatformTarget,
        linkage: Linkage,
    ) -> BuildArtifact {
        let cfg = CompileConfig {
            library_name: "h3".into(),
            source_dir: dir.join("src"),
            work_dir: dir.join("work"),
            linkage,
            defines: BTreeMap::new(),
        };
        let slices = compile_target(tc, target, &cfg).unwrap();
        merge_universal(tc, target, &slices, &dir.join("merged")).unwrap()
    }

    #[test]
    fn flat_bundle() {
        let fx = fixture(Some("h3api.h"));
        let tc = MockToolchain::new(["latLngToCell"]);
        let target = PlatformTarget::ios_device("12.0").unwrap();
        let artifact = build(&tc, fx.dir.path(), &target, Linkage::Dynamic);

        let bundle = assemble_bundle(&tc, &artifact, &fx.options).unwrap();
        assert!(bundle.root.ends_with("ios-arm64/H3.framework"));
        assert_eq!(bundle.binary, bundle.root.join("H3"));
        assert_eq!(bundle.install_name.as_deref(), Some("@rpath/H3.framework/H3"));
        assert!(bundle.root.join("Headers/h3api.h").is_file());
        assert!(bundle.root.join("Modules/module.modulemap").is_file());
        assert!(bundle.root.join("Info.plist").is_file());
        assert!(tc.signature(&bundle.binary).unwrap().signed);
    }

    #[cfg(unix)]
    #[test]
    fn versioned_bundle() {
        let fx = fixture(None);
        let tc = MockToolchain::new(["latLngToCell"]);
        let target = PlatformTarget::macos("10.15").unwrap();
        let artifact = build(&tc, fx.dir.path(), &target, Linkage::Dynamic);

        let bundle = assemble_bundle(&tc, &artifact, &fx.options).unwrap();
        assert_eq!(bundle.binary, bundle.root.join("Versions/A/H3"));
        assert_eq!(
            bundle.install_name.as_deref(),
            Some("@rpath/H3.framework/Versions/A/H3")
        );
        assert!(bundle.root.join("Resources/Info.plist").is_file());
        assert!(bundle.root.join("H3").is_file());
        assert!(!bundle.root.join("Modules").exists());
    }

    #[test]
    fn static_archive_skips_rewrite() {
        let fx = fixture(None);
        let tc = MockToolchain::new(["latLngToCell"]);
        let target = PlatformTarget::ios_device("12.0").unwrap();
        let artifact = build(&tc, fx.dir.path(), &target, Linkage::Static);

        let bundle = assemble_bundle(&tc, &artifact, &fx.options).unwrap();
        assert_eq!(bundle.install_name, None);
    }

    #[test]
    fn missing_umbrella_fails_copy_headers() {
        let fx = fixture(Some("nope.h"));
        let tc = MockToolchain::new(["latLngToCell"]);
        let target = PlatformTarget::ios_device("12.0").unwrap();
        let artifact = build(&tc, fx.dir.path(), &target, Linkage::Dynamic);

        let failure = assemble_bundle(&tc, &artifact, &fx.options).unwrap_err();
        assert_eq!(failure.step, AssemblyStep::CopyHeaders);
        assert_eq!(failure.target, "ios-arm64");
    }

    #[cfg(unix)]
    #[test]
    fn one_failure_does_not_stop_others() {
        let fx = fixture(None);
        let tc = MockToolchain::new(["latLngToCell"]).failing_sign("ios-arm64_x86_64-simulator");
        let artifacts: Vec<_> = PlatformTarget::apple_defaults()
            .iter()
            .map(|t| build(&tc, fx.dir.path(), t, Linkage::Dynamic))
            .collect();

        let outcome = assemble_all(&tc, &artifacts, &fx.options);
        assert_eq!(outcome.bundles.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].step, AssemblyStep::Sign);
        assert_eq!(outcome.failures[0].target, "ios-arm64_x86_64-simulator");

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.kind(), "AssemblyError");
    }
}

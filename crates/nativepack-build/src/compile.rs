//! Per-target compilation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use nativepack_targets::{Arch, PlatformTarget};
use nativepack_toolchain::{CompileRequest, Linkage, Toolchain, ToolchainError};
use tracing::{debug, info, info_span, warn, Span};

use crate::artifact::BuildArtifact;
use crate::error::{PipelineError, Result};

/// Inputs shared by every compile task of a run.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// CMake library target name.
    pub library_name: String,
    /// Source tree containing `CMakeLists.txt`.
    pub source_dir: PathBuf,
    /// Scratch root; slices build under `build/` and land under `slices/`.
    pub work_dir: PathBuf,
    pub linkage: Linkage,
    pub defines: BTreeMap<String, String>,
}

impl CompileConfig {
    fn request(&self, target: &PlatformTarget, arch: Arch) -> CompileRequest {
        let id = target.identifier();
        CompileRequest {
            target: target.clone(),
            arch,
            library_name: self.library_name.clone(),
            source_dir: self.source_dir.clone(),
            build_dir: self.work_dir.join("build").join(&id).join(arch.name()),
            output_dir: self.work_dir.join("slices").join(&id).join(arch.name()),
            linkage: self.linkage,
            defines: self.defines.clone(),
        }
    }
}

fn compilation_error(target: &PlatformTarget, err: ToolchainError) -> PipelineError {
    let diagnostic = match err.diagnostic() {
        Some(d) => d.trim().to_string(),
        None => err.to_string(),
    };
    PipelineError::Compilation {
        target: target.identifier(),
        diagnostic,
    }
}

/// Compile every architecture slice of one target, each in its own build
/// directory. Returns one single-arch artifact per slice, in arch order.
pub fn compile_target(
    toolchain: &dyn Toolchain,
    target: &PlatformTarget,
    config: &CompileConfig,
) -> Result<Vec<BuildArtifact>> {
    if config.linkage == Linkage::Static {
        warn!(
            target = %target,
            "static linkage requested; the result cannot satisfy symbol-by-name lookup"
        );
    }

    let mut artifacts = Vec::with_capacity(target.archs().len());
    for arch in target.archs() {
        let request = config.request(target, *arch);
        debug!(target = %target, %arch, build_dir = %request.build_dir.display(), "compiling slice");

        let path = toolchain
            .compile(&request)
            .map_err(|e| compilation_error(target, e))?;

        let archs = toolchain.architectures(&path)?;
        if archs != BTreeSet::from([*arch]) {
            return Err(PipelineError::Consistency {
                target: target.identifier(),
                detail: format!(
                    "slice built for {arch} reports architectures {}",
                    archs.iter().map(Arch::name).collect::<Vec<_>>().join(", ")
                ),
            });
        }

        let install_name = toolchain.install_name(&path)?;
        artifacts.push(BuildArtifact {
            target: target.clone(),
            path,
            archs,
            install_name,
        });
    }
    Ok(artifacts)
}

/// Compile all targets as parallel tasks and wait for every one of them.
///
/// Results come back in configuration order. If any task fails, the first
/// failure in that order is returned.
pub fn compile_all(
    toolchain: &dyn Toolchain,
    targets: &[PlatformTarget],
    config: &CompileConfig,
) -> Result<Vec<Vec<BuildArtifact>>> {
    let parent = Span::current();
    let results: Vec<Result<Vec<BuildArtifact>>> = std::thread::scope(|scope| {
        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let parent = parent.clone();
                scope.spawn(move || -> Result<Vec<BuildArtifact>> {
                    let span = info_span!(parent: &parent, "compile", target = %target);
                    let _enter = span.enter();
                    let artifacts = compile_target(toolchain, target, config)?;
                    info!(slices = artifacts.len(), "target compiled");
                    Ok(artifacts)
                })
            })
            .collect();

        handles
            .into_iter()
            .zip(targets)
            .map(|(handle, target)| {
                handle.join().unwrap_or_else(|_| {
                    Err(PipelineError::Compilation {
                        target: target.identifier(),
                        diagnostic: "compile task panicked".into(),
                    })
                })
            })
            .collect()
    });

    results.into_iter().collect()
}

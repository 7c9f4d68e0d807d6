//! Packaging pipeline orchestrator.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use nativepack_targets::{validate_target_set, PlatformTarget};
use nativepack_toolchain::{Linkage, Toolchain};
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::bundle::{assemble_all, AssemblyOptions, BundleMetadata, HeaderSet};
use crate::compile::{compile_all, CompileConfig};
use crate::error::{PipelineError, Result};
use crate::fsutil::remove_dir_if_exists;
use crate::merge::merge_universal;
use crate::package::{package, MultiPlatformPackage, PackageRequest};
use crate::report::PipelineReport;
use crate::source::{ensure_source, SourceConfig};
use crate::verify::{gate_or_halt, VerificationReport, VerifyConfig};

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// CMake library target (`lib<name>.dylib`).
    pub library_name: String,
    /// Framework and binary name inside bundles.
    pub framework_name: String,
    pub bundle_identifier: String,
    pub library_version: String,
    pub source: SourceConfig,
    /// Clone pinned sources when absent.
    pub fetch: bool,
    pub targets: Vec<PlatformTarget>,
    pub linkage: Linkage,
    pub defines: BTreeMap<String, String>,
    pub headers: HeaderSet,
    pub signing_identity: String,
    pub verify: VerifyConfig,
    /// Scratch space for build trees, slices, merged binaries and bundles.
    pub work_dir: PathBuf,
    /// The package lands at `<out_dir>/<framework_name>.xcframework`.
    pub out_dir: PathBuf,
}

impl PipelineConfig {
    fn metadata(&self) -> BundleMetadata {
        BundleMetadata::new(
            &self.framework_name,
            &self.bundle_identifier,
            &self.library_version,
        )
    }

    pub fn package_path(&self) -> PathBuf {
        self.out_dir
            .join(format!("{}.xcframework", self.framework_name))
    }

    /// Reject configurations that cannot produce a valid package.
    pub fn validate(&self) -> Result<()> {
        let config_error = |detail: String| PipelineError::Config { detail };

        if let Err(issues) = validate_target_set(&self.targets) {
            let errors: Vec<String> = issues
                .iter()
                .filter(|i| i.is_error())
                .map(|i| i.message.clone())
                .collect();
            for issue in issues.iter().filter(|i| !i.is_error()) {
                warn!("{}", issue.message);
            }
            if !errors.is_empty() {
                return Err(config_error(errors.join("; ")));
            }
        }
        if self.library_name.trim().is_empty() {
            return Err(config_error("library name is empty".into()));
        }
        self.metadata().validate().map_err(config_error)?;
        if self.verify.smoke_symbol.trim().is_empty() {
            return Err(config_error("no smoke-test symbol configured".into()));
        }
        if self.signing_identity.trim().is_empty() {
            return Err(config_error("signing identity is empty".into()));
        }
        Ok(())
    }
}

/// Output of a successful pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub package: MultiPlatformPackage,
    pub verification: VerificationReport,
    pub report: PipelineReport,
}

/// Run the full pipeline:
/// validate -> environment -> sources -> compile -> merge -> assemble ->
/// package -> verification gate -> report.
///
/// A failing gate deletes the package it was run on, so an error from this
/// function always means no package was produced.
pub fn run_pipeline(toolchain: &dyn Toolchain, config: &PipelineConfig) -> Result<PipelineOutput> {
    let run_id = Uuid::new_v4();
    let span = info_span!("pipeline", %run_id, toolchain = toolchain.name());
    let _enter = span.enter();
    let start = Instant::now();

    // Stage 1: configuration
    config.validate()?;

    // Stage 2: environment
    toolchain
        .check_environment()
        .map_err(|e| PipelineError::Environment {
            detail: e.to_string(),
        })?;

    // Stage 3: sources
    let source_revision = ensure_source(toolchain, &config.source, config.fetch)?;

    // Stage 4: per-target compilation (parallel, joined)
    let compile_config = CompileConfig {
        library_name: config.library_name.clone(),
        source_dir: config.source.dir.clone(),
        work_dir: config.work_dir.clone(),
        linkage: config.linkage,
        defines: config.defines.clone(),
    };
    let slices = compile_all(toolchain, &config.targets, &compile_config)?;
    info!(targets = slices.len(), "compilation finished");

    // Stage 5: universal merge
    let merged_dir = config.work_dir.join("merged");
    let merged = config
        .targets
        .iter()
        .zip(&slices)
        .map(|(target, parts)| merge_universal(toolchain, target, parts, &merged_dir))
        .collect::<Result<Vec<_>>>()?;

    // Stage 6: bundle assembly
    let options = AssemblyOptions {
        framework_name: config.framework_name.clone(),
        out_dir: config.work_dir.join("bundles"),
        headers: config.headers.clone(),
        metadata: config.metadata(),
        signing_identity: config.signing_identity.clone(),
    };
    let bundles = assemble_all(toolchain, &merged, &options).into_result()?;

    // Stage 7: packaging
    let request = PackageRequest {
        framework_name: config.framework_name.clone(),
        library_version: config.library_version.clone(),
        source_revision: source_revision.clone(),
        out_dir: config.out_dir.clone(),
    };
    let pkg = package(toolchain, &config.targets, &bundles, &request)?;

    // Stage 8: verification gate
    let verify = if config.verify.expected_targets.is_empty() {
        config.verify.clone().expecting(&config.targets)
    } else {
        config.verify.clone()
    };
    let verification = match gate_or_halt(toolchain, &pkg, &verify) {
        Ok(report) => report,
        Err(e) => {
            warn!(package = %pkg.root.display(), "removing package that failed verification");
            remove_dir_if_exists(&pkg.root)?;
            return Err(e);
        }
    };

    let report = PipelineReport {
        run_id,
        toolchain: toolchain.name().to_string(),
        framework_name: config.framework_name.clone(),
        library_version: config.library_version.clone(),
        source_revision,
        package: pkg.root.clone(),
        duration_ms: start.elapsed().as_millis() as u64,
        targets: pkg.manifest.targets.clone(),
        checks_run: verification.results.len(),
    };
    info!(package = %pkg.root.display(), duration_ms = report.duration_ms, "pipeline finished");

    Ok(PipelineOutput {
        package: pkg,
        verification,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::AssemblyStep;
    use crate::verify::CheckKind;
    use nativepack_targets::OsFamily;
    use nativepack_toolchain::mock::MockToolchain;
    use std::path::Path;

    const SYMBOLS: [&str; 3] = ["latLngToCell", "cellToLatLng", "getResolution"];

    fn config(dir: &Path) -> PipelineConfig {
        let src = dir.join("h3");
        let include = src.join("include");
        std::fs::create_dir_all(&include).unwrap();
        std::fs::write(include.join("h3api.h"), "").unwrap();
        PipelineConfig {
            library_name: "h3".into(),
            framework_name: "H3".into(),
            bundle_identifier: "org.example.h3".into(),
            library_version: "4.1.0".into(),
            source: SourceConfig {
                dir: src,
                pin: None,
            },
            fetch: false,
            targets: PlatformTarget::apple_defaults(),
            linkage: Linkage::Dynamic,
            defines: BTreeMap::new(),
            headers: HeaderSet {
                dir: include,
                umbrella: Some("h3api.h".into()),
            },
            signing_identity: "-".into(),
            verify: VerifyConfig {
                smoke_symbol: "latLngToCell".into(),
                required_symbols: vec!["cellToLatLng".into(), "getResolution".into()],
                expected_targets: Vec::new(),
            },
            work_dir: dir.join("work"),
            out_dir: dir.join("dist"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn full_pipeline_one_bundle_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let tc = MockToolchain::new(SYMBOLS);

        let output = run_pipeline(&tc, &cfg).unwrap();
        let ids: Vec<String> = cfg.targets.iter().map(|t| t.identifier()).collect();
        assert_eq!(output.package.target_ids(), ids);
        for id in &ids {
            output.package.bundle_for(id).unwrap();
        }
        assert!(output.verification.passed());
        assert_eq!(output.report.checks_run, ids.len() * CheckKind::ALL.len());
        assert!(cfg.package_path().join("manifest.json").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn packaged_binaries_are_relocatable_and_dynamic() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let tc = MockToolchain::new(SYMBOLS);

        let output = run_pipeline(&tc, &cfg).unwrap();
        for entry in &output.package.manifest.targets {
            let name = entry.install_name.as_deref().unwrap();
            assert!(name.starts_with("@rpath/H3.framework/"), "{name}");
            assert_eq!(entry.exported_symbols, SYMBOLS.len());
        }
    }

    #[cfg(unix)]
    #[test]
    fn repeated_runs_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let tc = MockToolchain::new(SYMBOLS);

        let first = run_pipeline(&tc, &cfg).unwrap().package.manifest;
        let second = run_pipeline(&tc, &cfg).unwrap().package.manifest;
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn static_linkage_is_caught_by_symbol_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.linkage = Linkage::Static;
        let tc = MockToolchain::new(SYMBOLS);

        let err = run_pipeline(&tc, &cfg).unwrap_err();
        match &err {
            PipelineError::Verification { check, target, detail } => {
                assert_eq!(*check, CheckKind::SymbolExport);
                assert_eq!(target, "ios-arm64");
                assert!(detail.contains("latLngToCell"), "{detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!cfg.package_path().exists());
    }

    #[test]
    fn compile_failure_produces_no_package() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let tc = MockToolchain::new(SYMBOLS).failing_compile(OsFamily::Macos);

        let err = run_pipeline(&tc, &cfg).unwrap_err();
        assert_eq!(err.kind(), "CompilationError");
        assert_eq!(err.target(), Some("macos-arm64_x86_64"));
        assert!(!cfg.package_path().exists());
        assert!(!dir.path().join("work/bundles").exists());
    }

    #[cfg(unix)]
    #[test]
    fn unsigned_binaries_fail_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let tc = MockToolchain::new(SYMBOLS).without_signing();

        let err = run_pipeline(&tc, &cfg).unwrap_err();
        match err {
            PipelineError::Verification { check, .. } => assert_eq!(check, CheckKind::Signature),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!cfg.package_path().exists());
    }

    #[test]
    fn missing_tool_is_an_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let tc = MockToolchain::new(SYMBOLS).missing_tool("lipo");

        let err = run_pipeline(&tc, &cfg).unwrap_err();
        assert_eq!(err.kind(), "EnvironmentError");
        assert!(err.to_string().contains("lipo"));
        assert_eq!(tc.compile_count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn assembly_failure_is_isolated_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let tc = MockToolchain::new(SYMBOLS).failing_sign("macos-arm64_x86_64");

        let err = run_pipeline(&tc, &cfg).unwrap_err();
        match err {
            PipelineError::Assembly { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].target, "macos-arm64_x86_64");
                assert_eq!(failures[0].step, AssemblyStep::Sign);
            }
            other => panic!("unexpected error: {other}"),
        }
        let bundles = dir.path().join("work/bundles");
        assert!(bundles.join("ios-arm64/H3.framework/H3").is_file());
        assert!(bundles.join("ios-arm64_x86_64-simulator/H3.framework/H3").is_file());
        assert!(!cfg.package_path().exists());
    }

    #[test]
    fn absolute_install_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.targets = vec![PlatformTarget::ios_device("12.0").unwrap()];
        let tc = MockToolchain::new(SYMBOLS).keeping_absolute_install_names();

        let err = run_pipeline(&tc, &cfg).unwrap_err();
        match err {
            PipelineError::Assembly { failures } => {
                assert_eq!(failures[0].step, AssemblyStep::RewriteSelfReference);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.targets.push(PlatformTarget::ios_device("13.0").unwrap());
        let tc = MockToolchain::new(SYMBOLS);
        assert_eq!(run_pipeline(&tc, &cfg).unwrap_err().kind(), "ConfigError");

        let mut cfg = config(dir.path());
        cfg.bundle_identifier = "not an id".into();
        assert_eq!(run_pipeline(&tc, &cfg).unwrap_err().kind(), "ConfigError");

        let mut cfg = config(dir.path());
        cfg.targets.clear();
        assert_eq!(run_pipeline(&tc, &cfg).unwrap_err().kind(), "ConfigError");
    }
}

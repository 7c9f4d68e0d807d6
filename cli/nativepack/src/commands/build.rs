//! `nativepack build`: run the packaging pipeline.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use nativepack_build::{run_pipeline, PipelineConfig, PipelineReport};
use nativepack_toolchain::{SystemToolchain, Toolchain};

use crate::manifest::ProjectManifest;

/// Report of the last successful run, written into the scratch directory.
pub const REPORT_FILE: &str = "last-build.json";

/// Build, package and verify every configured target.
pub fn run(
    project_dir: &Path,
    manifest: &ProjectManifest,
    targets: &[String],
    out_dir: Option<&Path>,
    skip_fetch: bool,
) -> Result<()> {
    let config = manifest.to_pipeline_config(project_dir, out_dir, targets, !skip_fetch)?;
    let toolchain = if config.source.pin.is_some() && !skip_fetch {
        SystemToolchain::with_git()
    } else {
        SystemToolchain::new()
    };

    let report = build_with(&toolchain, &config)?;
    println!("{report}");
    Ok(())
}

pub(crate) fn build_with(toolchain: &dyn Toolchain, config: &PipelineConfig) -> Result<PipelineReport> {
    println!(
        "Packaging {} {} for {} target(s)",
        config.framework_name,
        config.library_version,
        config.targets.len()
    );

    let output = run_pipeline(toolchain, config).map_err(|e| {
        let kind = e.kind();
        anyhow::Error::new(e).context(format!("{kind}: no package was produced"))
    })?;

    let json = serde_json::to_string_pretty(&output.report).context("serializing build report")?;
    let report_path = config.work_dir.join(REPORT_FILE);
    fs::write(&report_path, json)
        .with_context(|| format!("writing {}", report_path.display()))?;

    Ok(output.report)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nativepack_toolchain::mock::MockToolchain;

    const MANIFEST: &str = r#"
[library]
name = "h3"
framework-name = "H3"
bundle-identifier = "org.example.h3"
version = "4.1.0"

[source]
path = "vendor/h3"

[headers]
dir = "vendor/h3/include"
umbrella = "h3api.h"

[verify]
smoke-symbol = "latLngToCell"
symbols = ["cellToLatLng"]
"#;

    fn project(dir: &Path, manifest: &str) -> ProjectManifest {
        let include = dir.join("vendor/h3/include");
        fs::create_dir_all(&include).unwrap();
        fs::write(include.join("h3api.h"), "").unwrap();
        ProjectManifest::from_str(manifest).unwrap()
    }

    #[test]
    fn build_produces_verified_package_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = project(dir.path(), MANIFEST);
        let config = manifest.to_pipeline_config(dir.path(), None, &[], false).unwrap();
        let tc = MockToolchain::new(["latLngToCell", "cellToLatLng"]);

        let report = build_with(&tc, &config).unwrap();
        assert_eq!(report.targets.len(), 3);
        assert!(manifest.default_package_path(dir.path()).join("Info.plist").is_file());

        let json = fs::read_to_string(config.work_dir.join(REPORT_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["framework_name"], "H3");
        assert_eq!(value["targets"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn build_failure_names_error_kind() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = project(
            dir.path(),
            &MANIFEST.replace("[verify]", "[build]\nlinkage = \"static\"\n\n[verify]"),
        );
        let config = manifest.to_pipeline_config(dir.path(), None, &[], false).unwrap();
        let tc = MockToolchain::new(["latLngToCell", "cellToLatLng"]);

        let err = build_with(&tc, &config).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.starts_with("VerificationError"), "{message}");
        assert!(message.contains("symbol-export"), "{message}");
        assert!(!manifest.default_package_path(dir.path()).exists());
    }
}

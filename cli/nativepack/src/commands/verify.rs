//! `nativepack verify`: re-run the integrity checks on an existing package.

use std::path::Path;

use anyhow::{bail, Context, Result};
use nativepack_build::{
    verification_gate, GateDecision, MultiPlatformPackage, VerificationReport, VerifyConfig,
};
use nativepack_toolchain::{SystemToolchain, Toolchain};

use crate::manifest::ProjectManifest;

/// Verify the package at `package` (default: the project's build output).
pub fn run(project_dir: &Path, manifest: &ProjectManifest, package: Option<&Path>) -> Result<()> {
    let path = match package {
        Some(p) => project_dir.join(p),
        None => manifest.default_package_path(project_dir),
    };
    let report = verify_with(&SystemToolchain::new(), &path, &manifest.verify_config())?;
    println!("{report}");
    Ok(())
}

/// Open and verify a package. A halted gate prints the full report and fails
/// with the first failing check and its target.
pub(crate) fn verify_with(
    toolchain: &dyn Toolchain,
    path: &Path,
    config: &VerifyConfig,
) -> Result<VerificationReport> {
    let package = MultiPlatformPackage::open(path)
        .with_context(|| format!("opening package {}", path.display()))?;

    match verification_gate(toolchain, &package, config) {
        GateDecision::Pass { report } => Ok(report),
        GateDecision::Halt { failed, report } => {
            println!("{report}");
            match report.first_failure() {
                Some(first) => bail!(
                    "{failed} check(s) failed; first: {} on {}: {}",
                    first.check,
                    first.target,
                    first.detail
                ),
                None => bail!("{failed} check(s) failed"),
            }
        }
    }
}

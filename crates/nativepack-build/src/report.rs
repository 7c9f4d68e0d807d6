//! Pipeline run report.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::package::PackagedTarget;

/// Summary of a successful pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub toolchain: String,
    pub framework_name: String,
    pub library_version: String,
    pub source_revision: Option<String>,
    pub package: PathBuf,
    pub duration_ms: u64,
    pub targets: Vec<PackagedTarget>,
    pub checks_run: usize,
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Package Report ===")?;
        writeln!(f, "Run: {}", self.run_id)?;
        writeln!(
            f,
            "Library: {} {} ({} toolchain)",
            self.framework_name, self.library_version, self.toolchain
        )?;
        if let Some(rev) = &self.source_revision {
            writeln!(f, "Source: {rev}")?;
        }
        writeln!(f, "Package: {}", self.package.display())?;
        writeln!(f, "Duration: {} ms", self.duration_ms)?;

        writeln!(f)?;
        writeln!(f, "--- Targets ({}) ---", self.targets.len())?;
        for t in &self.targets {
            writeln!(
                f,
                "  {:<32} {:>4} symbols  {}",
                t.identifier,
                t.exported_symbols,
                t.install_name.as_deref().unwrap_or("<no install name>")
            )?;
            writeln!(f, "  {:<32} sha256 {}", "", t.sha256)?;
        }

        writeln!(f)?;
        writeln!(f, "--- Verification: PASSED ({} checks) ---", self.checks_run)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::FrameworkLayout;
    use nativepack_targets::PlatformTarget;

    #[test]
    fn report_display() {
        let report = PipelineReport {
            run_id: Uuid::nil(),
            toolchain: "mock".into(),
            framework_name: "H3".into(),
            library_version: "4.1.0".into(),
            source_revision: Some("5b9ef4e".into()),
            package: PathBuf::from("dist/H3.xcframework"),
            duration_ms: 42,
            targets: vec![PackagedTarget {
                identifier: "ios-arm64".into(),
                target: PlatformTarget::ios_device("12.0").unwrap(),
                layout: FrameworkLayout::Flat,
                bundle_path: PathBuf::from("ios-arm64/H3.framework"),
                binary_path: PathBuf::from("ios-arm64/H3.framework/H3"),
                install_name: Some("@rpath/H3.framework/H3".into()),
                sha256: "ab".repeat(32),
                exported_symbols: 87,
            }],
            checks_run: 5,
        };

        let output = format!("{report}");
        assert!(output.contains("Package Report"));
        assert!(output.contains("H3 4.1.0 (mock toolchain)"));
        assert!(output.contains("ios-arm64"));
        assert!(output.contains("@rpath/H3.framework/H3"));
        assert!(output.contains("PASSED (5 checks)"));
    }
}

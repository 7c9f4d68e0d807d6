//! Integrity verification of a finished package.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use nativepack_targets::PlatformTarget;
use nativepack_toolchain::{BinaryKind, Toolchain, RPATH_TOKEN};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::SymbolExportRecord;
use crate::bundle::plist::lookup_string;
use crate::error::{PipelineError, Result};
use crate::fsutil::sha256_file;
use crate::package::{MultiPlatformPackage, PackagedTarget};

/// The checks run against every packaged target, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    Structure,
    SymbolExport,
    Signature,
    SelfReference,
    ContentHash,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        Self::Structure,
        Self::SymbolExport,
        Self::Signature,
        Self::SelfReference,
        Self::ContentHash,
    ];

    /// Stable check id used in reports and exit diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::SymbolExport => "symbol-export",
            Self::Signature => "signature",
            Self::SelfReference => "self-reference",
            Self::ContentHash => "content-hash",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one check on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: CheckKind,
    pub target: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(check: CheckKind, target: &str, detail: impl Into<String>) -> Self {
        Self {
            check,
            target: target.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(check: CheckKind, target: &str, detail: impl Into<String>) -> Self {
        Self {
            check,
            target: target.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }

    fn from_outcome(check: CheckKind, target: &str, outcome: std::result::Result<String, String>) -> Self {
        match outcome {
            Ok(detail) => Self::pass(check, target, detail),
            Err(detail) => Self::fail(check, target, detail),
        }
    }
}

/// Names the verifier requires in every slice's dynamic symbol table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Routine probed first; its absence means the library is unusable.
    pub smoke_symbol: String,
    /// Further routines the FFI layer binds.
    pub required_symbols: Vec<String>,
    /// Targets the package must cover exactly once each. Empty accepts
    /// whatever the package manifest lists.
    #[serde(default)]
    pub expected_targets: Vec<PlatformTarget>,
}

impl VerifyConfig {
    pub fn new(smoke_symbol: impl Into<String>) -> Self {
        Self {
            smoke_symbol: smoke_symbol.into(),
            required_symbols: Vec::new(),
            expected_targets: Vec::new(),
        }
    }

    pub fn expecting(mut self, targets: &[PlatformTarget]) -> Self {
        self.expected_targets = targets.to_vec();
        self
    }

    /// Smoke symbol first, then the rest without duplicates.
    pub fn all_symbols(&self) -> Vec<&str> {
        let mut all = vec![self.smoke_symbol.as_str()];
        for s in &self.required_symbols {
            if !all.contains(&s.as_str()) {
                all.push(s);
            }
        }
        all
    }
}

/// Every check result for a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub package: PathBuf,
    pub results: Vec<CheckResult>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn first_failure(&self) -> Option<&CheckResult> {
        self.failures().next()
    }

    pub fn results_for<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a CheckResult> {
        self.results.iter().filter(move |r| r.target == target)
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Verification: {} ===", self.package.display())?;
        let mut current = None;
        for result in &self.results {
            if current != Some(result.target.as_str()) {
                writeln!(f, "{}", result.target)?;
                current = Some(result.target.as_str());
            }
            writeln!(
                f,
                "  [{}] {:<15} {}",
                if result.passed { "PASS" } else { "FAIL" },
                result.check.name(),
                result.detail
            )?;
        }
        let failed = self.failures().count();
        writeln!(
            f,
            "{} checks, {} passed, {} failed",
            self.results.len(),
            self.results.len() - failed,
            failed
        )
    }
}

fn check_structure(pkg: &MultiPlatformPackage, entry: &PackagedTarget, top_plist: Option<&str>) -> std::result::Result<String, String> {
    let name = &pkg.manifest.framework_name;
    let root = pkg.bundle_root(entry);
    if !root.is_dir() {
        return Err(format!("bundle directory {} is missing", entry.bundle_path.display()));
    }
    let missing: Vec<String> = entry
        .layout
        .required_entries(name)
        .into_iter()
        .filter(|rel| !root.join(rel).exists())
        .map(|rel| rel.display().to_string())
        .collect();
    if !missing.is_empty() {
        return Err(format!("bundle lacks {}", missing.join(", ")));
    }

    let headers = entry.layout.headers_dir(&root);
    let has_header = std::fs::read_dir(&headers)
        .map(|mut d| d.next().is_some())
        .unwrap_or(false);
    if !has_header {
        return Err("Headers directory is empty".into());
    }

    let plist_path = entry.layout.info_plist_path(&root);
    let plist = std::fs::read_to_string(&plist_path).map_err(|e| e.to_string())?;
    match lookup_string(&plist, "CFBundleExecutable") {
        Some(exe) if exe == *name => {}
        other => {
            return Err(format!(
                "Info.plist CFBundleExecutable is {} instead of {name}",
                other.as_deref().unwrap_or("<missing>")
            ))
        }
    }

    match top_plist {
        None => Err("package Info.plist is missing".into()),
        Some(xml) if !xml.contains(&format!("<string>{}</string>", entry.identifier)) => {
            Err("package Info.plist does not list this library".into())
        }
        Some(_) => Ok(format!("{} complete", entry.bundle_path.display())),
    }
}

fn check_symbols(
    toolchain: &dyn Toolchain,
    entry: &PackagedTarget,
    binary: &Path,
    config: &VerifyConfig,
) -> std::result::Result<String, String> {
    let archs = toolchain.architectures(binary).map_err(|e| e.to_string())?;
    if &archs != entry.target.archs() {
        let got: Vec<&str> = archs.iter().map(|a| a.name()).collect();
        return Err(format!("binary contains slices [{}]", got.join(", ")));
    }

    let kind = toolchain.binary_kind(binary).map_err(|e| e.to_string())?;
    let record = SymbolExportRecord::collect(toolchain, &entry.target, binary, &archs)
        .map_err(|e| e.to_string())?;
    let required = config.all_symbols();
    let missing = record.missing(required.iter().copied());
    if missing.is_empty() {
        return Ok(format!("{} symbols exported by every slice", required.len()));
    }

    let listed: Vec<String> = missing
        .iter()
        .map(|(sym, archs)| {
            let archs: Vec<&str> = archs.iter().map(|a| a.name()).collect();
            format!("{sym} (missing in {})", archs.join(", "))
        })
        .collect();
    let prefix = if kind == BinaryKind::DynamicLibrary {
        String::new()
    } else {
        format!("binary is {kind:?}, not a dynamic library; ")
    };
    Err(format!("{prefix}not exported: {}", listed.join(", ")))
}

fn check_signature(toolchain: &dyn Toolchain, binary: &Path) -> std::result::Result<String, String> {
    let record = toolchain.signature(binary).map_err(|e| e.to_string())?;
    if record.signed {
        Ok(format!(
            "signed by {}",
            record.authority.as_deref().unwrap_or("unknown authority")
        ))
    } else {
        Err("binary is not signed".into())
    }
}

fn check_self_reference(
    toolchain: &dyn Toolchain,
    pkg: &MultiPlatformPackage,
    entry: &PackagedTarget,
    binary: &Path,
) -> std::result::Result<String, String> {
    let expected = entry.layout.install_name(&pkg.manifest.framework_name);
    match toolchain.install_name(binary).map_err(|e| e.to_string())? {
        None => Err("binary has no install name".into()),
        Some(actual) if actual.starts_with('/') => {
            Err(format!("install name {actual} is an absolute path"))
        }
        Some(actual) if !actual.starts_with(&format!("{RPATH_TOKEN}/")) => {
            Err(format!("install name {actual} is not rooted at {RPATH_TOKEN}"))
        }
        Some(actual) if actual != expected => {
            Err(format!("install name {actual} does not match {expected}"))
        }
        Some(actual) => Ok(actual),
    }
}

fn check_content_hash(entry: &PackagedTarget, binary: &Path) -> std::result::Result<String, String> {
    let actual = sha256_file(binary).map_err(|e| e.to_string())?;
    if actual == entry.sha256 {
        Ok(actual)
    } else {
        Err(format!("sha256 {actual} differs from manifest {}", entry.sha256))
    }
}

/// A failed structure check followed by every other check marked as not run.
fn push_structure_failure(results: &mut Vec<CheckResult>, id: &str, detail: String) {
    results.push(CheckResult::fail(CheckKind::Structure, id, detail));
    for check in &CheckKind::ALL[1..] {
        results.push(CheckResult::fail(*check, id, "not run: bundle structure is incomplete"));
    }
}

/// Compare the packaged targets with the expected set. Records a structure
/// failure for each expected target packaged zero or several times and for
/// each packaged target nobody expects, and returns the identifiers whose
/// entries must not be checked further.
fn check_coverage(
    package: &MultiPlatformPackage,
    expected: &[PlatformTarget],
    results: &mut Vec<CheckResult>,
) -> BTreeSet<String> {
    let mut excluded = BTreeSet::new();
    if expected.is_empty() {
        return excluded;
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &package.manifest.targets {
        *counts.entry(entry.identifier.as_str()).or_default() += 1;
    }

    let mut wanted = BTreeSet::new();
    for target in expected {
        let id = target.identifier();
        if !wanted.insert(id.clone()) {
            continue;
        }
        match counts.get(id.as_str()).copied().unwrap_or(0) {
            0 => push_structure_failure(results, &id, format!("package has no bundle for {id}")),
            1 => {}
            n => {
                push_structure_failure(results, &id, format!("package lists {n} bundles for {id}"));
                excluded.insert(id);
            }
        }
    }
    for id in counts.keys().filter(|id| !wanted.contains(**id)) {
        push_structure_failure(results, id, format!("bundle {id} has no configured target"));
        excluded.insert(id.to_string());
    }
    excluded
}

/// Run every check on every packaged target.
///
/// When `config` names expected targets, coverage is checked first: missing,
/// duplicated and unexpected bundles fail the structure check. A target whose
/// structure check fails is not probed further; its remaining checks are
/// reported as failed with that reason.
pub fn verify_package(
    toolchain: &dyn Toolchain,
    package: &MultiPlatformPackage,
    config: &VerifyConfig,
) -> VerificationReport {
    let top_plist = std::fs::read_to_string(package.info_plist_path()).ok();
    let mut results = Vec::new();
    let excluded = check_coverage(package, &config.expected_targets, &mut results);

    for entry in &package.manifest.targets {
        let id = entry.identifier.as_str();
        if excluded.contains(id) {
            continue;
        }
        let binary = package.binary_path(entry);

        let structure = CheckResult::from_outcome(
            CheckKind::Structure,
            id,
            check_structure(package, entry, top_plist.as_deref()),
        );
        if !structure.passed {
            push_structure_failure(&mut results, id, structure.detail);
            continue;
        }
        results.push(structure);

        results.push(CheckResult::from_outcome(
            CheckKind::SymbolExport,
            id,
            check_symbols(toolchain, entry, &binary, config),
        ));
        results.push(CheckResult::from_outcome(
            CheckKind::Signature,
            id,
            check_signature(toolchain, &binary),
        ));
        results.push(CheckResult::from_outcome(
            CheckKind::SelfReference,
            id,
            check_self_reference(toolchain, package, entry, &binary),
        ));
        results.push(CheckResult::from_outcome(
            CheckKind::ContentHash,
            id,
            check_content_hash(entry, &binary),
        ));
    }

    VerificationReport {
        package: package.root.clone(),
        results,
    }
}

/// The gate's decision on whether the package may be published.
#[derive(Debug)]
pub enum GateDecision {
    /// Every check passed.
    Pass { report: VerificationReport },
    /// At least one check failed; the package must not ship.
    Halt {
        failed: usize,
        report: VerificationReport,
    },
}

/// Verify the package and decide.
pub fn verification_gate(
    toolchain: &dyn Toolchain,
    package: &MultiPlatformPackage,
    config: &VerifyConfig,
) -> GateDecision {
    let report = verify_package(toolchain, package, config);
    let failed = report.failures().count();
    if failed > 0 {
        warn!(failed, "verification gate halted");
        GateDecision::Halt { failed, report }
    } else {
        info!(checks = report.results.len(), "verification gate passed");
        GateDecision::Pass { report }
    }
}

/// Run the gate and turn a halt into the first failing check's error.
pub fn gate_or_halt(
    toolchain: &dyn Toolchain,
    package: &MultiPlatformPackage,
    config: &VerifyConfig,
) -> Result<VerificationReport> {
    match verification_gate(toolchain, package, config) {
        GateDecision::Pass { report } => Ok(report),
        GateDecision::Halt { report, .. } => {
            let Some(first) = report.first_failure() else {
                return Ok(report);
            };
            Err(PipelineError::Verification {
                check: first.check,
                target: first.target.clone(),
                detail: first.detail.clone(),
            })
        }
    }
}

//! TOML parsing, serialization, and validation for target sets.
//!
//! A target set is a list of `[[targets]]` tables, either in a standalone
//! `targets.toml` or embedded in the project manifest.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TargetError};
use crate::platform::{parse_os_version, PlatformTarget};

/// A validation issue found in a target set.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity: "error" or "warning".
    pub severity: &'static str,
    /// Human-readable description.
    pub message: String,
}

impl ValidationIssue {
    fn error(message: String) -> Self {
        Self {
            severity: "error",
            message,
        }
    }

    fn warning(message: String) -> Self {
        Self {
            severity: "warning",
            message,
        }
    }

    /// Whether this issue blocks a pipeline run.
    pub fn is_error(&self) -> bool {
        self.severity == "error"
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TargetsFile {
    #[serde(default)]
    targets: Vec<PlatformTarget>,
}

/// Load a target set from a TOML file.
pub fn load_targets_toml(path: &Path) -> Result<Vec<PlatformTarget>> {
    if !path.exists() {
        return Err(TargetError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_targets_toml(&content)
}

/// Parse a target set from a TOML string.
pub fn parse_targets_toml(toml_str: &str) -> Result<Vec<PlatformTarget>> {
    let file: TargetsFile = toml::from_str(toml_str)?;
    Ok(file.targets)
}

/// Serialize a target set to pretty TOML.
pub fn targets_to_toml(targets: &[PlatformTarget]) -> Result<String> {
    let file = TargetsFile {
        targets: targets.to_vec(),
    };
    Ok(toml::to_string_pretty(&file)?)
}

/// Validate a configured target set as a whole.
///
/// Individual targets are already valid by construction; this checks the
/// properties of the set that a multi-platform package depends on.
/// Returns `Ok(())` if valid, or `Err(issues)` with every problem found.
pub fn validate_target_set(targets: &[PlatformTarget]) -> std::result::Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    if targets.is_empty() {
        issues.push(ValidationIssue::error("no targets configured".into()));
    }

    // 1. Identifiers are unique
    let mut seen: HashMap<String, usize> = HashMap::new();
    for t in targets {
        *seen.entry(t.identifier()).or_default() += 1;
    }
    let mut duplicates: Vec<_> = seen.into_iter().filter(|(_, n)| *n > 1).collect();
    duplicates.sort();
    for (id, n) in duplicates {
        issues.push(ValidationIssue::error(format!(
            "target '{id}' is configured {n} times"
        )));
    }

    // 2. One library per platform/variant pair (a package cannot hold two)
    let mut by_os: HashMap<_, Vec<String>> = HashMap::new();
    for t in targets {
        by_os.entry(t.os()).or_default().push(t.identifier());
    }
    let mut crowded: Vec<_> = by_os.into_iter().filter(|(_, ids)| ids.len() > 1).collect();
    crowded.sort_by_key(|(os, _)| *os);
    for (os, mut ids) in crowded {
        ids.sort();
        ids.dedup();
        if ids.len() > 1 {
            issues.push(ValidationIssue::error(format!(
                "{os} has more than one target ({}); merge them into one architecture set",
                ids.join(", ")
            )));
        }
    }

    // 3. Deployment target not below what the SDK still builds for
    for t in targets {
        let floor = t.os().minimum_supported_version();
        if let (Ok(v), Ok(min)) = (parse_os_version(t.min_os_version()), parse_os_version(floor)) {
            if v < min {
                issues.push(ValidationIssue::warning(format!(
                    "target '{}' sets minimum OS {} below the supported floor {floor}",
                    t.identifier(),
                    t.min_os_version()
                )));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

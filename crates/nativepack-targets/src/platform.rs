//! The platform target triple.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TargetError};
use crate::os::{Arch, BundleLayoutKind, OsFamily};

/// On-disk shape of a target definition (`[[targets]]` table entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetSpec {
    /// OS family.
    pub os: OsFamily,
    /// Architectures to build.
    pub archs: Vec<Arch>,
    /// Minimum OS version.
    pub min_os_version: String,
}

/// One (OS family, architecture set, minimum OS version) build configuration.
///
/// Immutable once constructed. Construction validates that the architecture
/// set is non-empty and supported by the OS family and that the minimum OS
/// version is numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TargetSpec", into = "TargetSpec")]
pub struct PlatformTarget {
    os: OsFamily,
    archs: BTreeSet<Arch>,
    min_os_version: String,
}

impl PlatformTarget {
    /// Build a target, validating the triple.
    pub fn new(
        os: OsFamily,
        archs: impl IntoIterator<Item = Arch>,
        min_os_version: impl Into<String>,
    ) -> Result<Self> {
        let archs: BTreeSet<Arch> = archs.into_iter().collect();
        let min_os_version = min_os_version.into();

        if archs.is_empty() {
            return Err(TargetError::Validation {
                detail: format!("target for {os} has no architectures"),
            });
        }
        for arch in &archs {
            if !os.supported_archs().contains(arch) {
                return Err(TargetError::Validation {
                    detail: format!("architecture {arch} is not supported on {os}"),
                });
            }
        }
        parse_os_version(&min_os_version)?;

        Ok(Self {
            os,
            archs,
            min_os_version,
        })
    }

    /// OS family.
    pub fn os(&self) -> OsFamily {
        self.os
    }

    /// Architectures, in identifier order.
    pub fn archs(&self) -> &BTreeSet<Arch> {
        &self.archs
    }

    /// Minimum OS version string as configured (e.g. "12.0").
    pub fn min_os_version(&self) -> &str {
        &self.min_os_version
    }

    /// Whether the target needs a universal (multi-slice) binary.
    pub fn is_universal(&self) -> bool {
        self.archs.len() > 1
    }

    /// Bundle layout convention for this target.
    pub fn layout(&self) -> BundleLayoutKind {
        self.os.layout()
    }

    /// XCFramework library identifier, e.g. `ios-arm64_x86_64-simulator`.
    pub fn identifier(&self) -> String {
        let archs: Vec<&str> = self.archs.iter().map(Arch::name).collect();
        let mut id = format!("{}-{}", self.os.platform(), archs.join("_"));
        if let Some(variant) = self.os.variant() {
            id.push('-');
            id.push_str(variant);
        }
        id
    }

    /// iOS device target (arm64).
    pub fn ios_device(min_os_version: &str) -> Result<Self> {
        Self::new(OsFamily::Ios, [Arch::Arm64], min_os_version)
    }

    /// iOS simulator target (arm64 + x86_64).
    pub fn ios_simulator(min_os_version: &str) -> Result<Self> {
        Self::new(OsFamily::IosSimulator, Arch::ALL, min_os_version)
    }

    /// macOS target (arm64 + x86_64).
    pub fn macos(min_os_version: &str) -> Result<Self> {
        Self::new(OsFamily::Macos, Arch::ALL, min_os_version)
    }

    /// Mac Catalyst target (arm64 + x86_64).
    pub fn mac_catalyst(min_os_version: &str) -> Result<Self> {
        Self::new(OsFamily::MacCatalyst, Arch::ALL, min_os_version)
    }

    /// The default Apple target set: iOS device, iOS simulator, macOS.
    pub fn apple_defaults() -> Vec<Self> {
        builtin_presets()
            .into_iter()
            .filter(|(t, _)| t.os != OsFamily::MacCatalyst)
            .map(|(t, _)| t)
            .collect()
    }
}

impl TryFrom<TargetSpec> for PlatformTarget {
    type Error = TargetError;

    fn try_from(spec: TargetSpec) -> Result<Self> {
        Self::new(spec.os, spec.archs, spec.min_os_version)
    }
}

impl From<PlatformTarget> for TargetSpec {
    fn from(t: PlatformTarget) -> Self {
        TargetSpec {
            os: t.os,
            archs: t.archs.into_iter().collect(),
            min_os_version: t.min_os_version,
        }
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// Parse an OS version such as `12`, `12.0` or `10.15.4` into a comparable
/// semantic version (missing components are zero).
pub fn parse_os_version(s: &str) -> Result<semver::Version> {
    let parts: Vec<&str> = s.trim().split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(TargetError::Validation {
            detail: format!("'{s}' is not a valid OS version"),
        });
    }
    let mut padded = parts.clone();
    while padded.len() < 3 {
        padded.push("0");
    }
    semver::Version::parse(&padded.join(".")).map_err(|e| TargetError::Validation {
        detail: format!("'{s}' is not a valid OS version: {e}"),
    })
}

/// Built-in targets with a short description each.
pub fn builtin_presets() -> Vec<(PlatformTarget, &'static str)> {
    // Fixed, known-valid triples; construction cannot fail.
    let preset = |os, archs: &[Arch], min: &str| PlatformTarget {
        os,
        archs: archs.iter().copied().collect(),
        min_os_version: min.to_string(),
    };
    vec![
        (
            preset(OsFamily::Ios, &[Arch::Arm64], "12.0"),
            "iOS devices (arm64, iOS 12.0+)",
        ),
        (
            preset(OsFamily::IosSimulator, &Arch::ALL, "12.0"),
            "iOS simulator (arm64 + x86_64, iOS 12.0+)",
        ),
        (
            preset(OsFamily::Macos, &Arch::ALL, "10.15"),
            "macOS (arm64 + x86_64, macOS 10.15+)",
        ),
        (
            preset(OsFamily::MacCatalyst, &Arch::ALL, "14.0"),
            "Mac Catalyst (arm64 + x86_64, iOS 14.0+)",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_follow_xcframework_convention() {
        assert_eq!(PlatformTarget::ios_device("12.0").unwrap().identifier(), "ios-arm64");
        assert_eq!(
            PlatformTarget::ios_simulator("12.0").unwrap().identifier(),
            "ios-arm64_x86_64-simulator"
        );
        assert_eq!(
            PlatformTarget::macos("10.15").unwrap().identifier(),
            "macos-arm64_x86_64"
        );
        assert_eq!(
            PlatformTarget::mac_catalyst("14.0").unwrap().identifier(),
            "ios-arm64_x86_64-maccatalyst"
        );
    }

    #[test]
    fn arch_order_is_canonical() {
        let a = PlatformTarget::new(OsFamily::Macos, [Arch::X86_64, Arch::Arm64], "11.0").unwrap();
        let b = PlatformTarget::new(OsFamily::Macos, [Arch::Arm64, Arch::X86_64], "11.0").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.identifier(), "macos-arm64_x86_64");
        assert!(a.is_universal());
    }

    #[test]
    fn rejects_empty_arch_set() {
        let err = PlatformTarget::new(OsFamily::Ios, Vec::new(), "12.0").unwrap_err();
        assert!(err.to_string().contains("no architectures"));
    }

    #[test]
    fn rejects_unsupported_arch() {
        let err = PlatformTarget::new(OsFamily::Ios, [Arch::X86_64], "12.0").unwrap_err();
        assert!(err.to_string().contains("not supported on ios"));
    }

    #[test]
    fn rejects_bad_version() {
        assert!(PlatformTarget::ios_device("twelve").is_err());
        assert!(PlatformTarget::ios_device("12..0").is_err());
        assert!(PlatformTarget::ios_device("1.2.3.4").is_err());
    }

    #[test]
    fn os_versions_compare_numerically() {
        let a = parse_os_version("10.9").unwrap();
        let b = parse_os_version("10.15").unwrap();
        assert!(a < b);
        assert_eq!(parse_os_version("12").unwrap(), semver::Version::new(12, 0, 0));
    }

    #[test]
    fn apple_defaults_has_three_targets() {
        let defaults = PlatformTarget::apple_defaults();
        assert_eq!(defaults.len(), 3);
        assert!(defaults.iter().all(|t| t.os() != OsFamily::MacCatalyst));
    }

    #[test]
    fn presets_are_valid() {
        for (t, _) in builtin_presets() {
            let rebuilt =
                PlatformTarget::new(t.os(), t.archs().iter().copied(), t.min_os_version()).unwrap();
            assert_eq!(rebuilt, t);
        }
    }
}

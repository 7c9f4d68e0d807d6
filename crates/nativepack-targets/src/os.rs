//! OS family and architecture vocabulary.
//!
//! Each OS family carries the facts the pipeline needs about it: how to point
//! CMake and clang at it, how XCFramework metadata names it, and which bundle
//! layout convention its frameworks use.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TargetError};

/// A processor architecture a slice can be compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Arch {
    /// All known architectures, in identifier order.
    pub const ALL: [Arch; 2] = [Arch::Arm64, Arch::X86_64];

    /// The name used by `lipo`, `nm -arch` and XCFramework identifiers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }

    /// Parse an architecture name as printed by `lipo -archs`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "x86_64" | "x86-64" => Ok(Self::X86_64),
            other => Err(TargetError::UnknownArch { name: other.into() }),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bundle layout convention used by an OS family's frameworks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleLayoutKind {
    /// Binary, headers and Info.plist directly under the bundle root.
    Flat,
    /// Contents under `Versions/<v>/` with root symlinks to `Versions/Current`.
    Versioned,
}

/// Operating-system family a target is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OsFamily {
    /// iOS devices.
    Ios,
    /// The iOS simulator.
    IosSimulator,
    /// macOS desktop.
    Macos,
    /// iOS apps running on macOS.
    MacCatalyst,
}

impl OsFamily {
    /// All known OS families.
    pub const ALL: [OsFamily; 4] = [
        OsFamily::Ios,
        OsFamily::IosSimulator,
        OsFamily::Macos,
        OsFamily::MacCatalyst,
    ];

    /// Canonical configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::IosSimulator => "ios-simulator",
            Self::Macos => "macos",
            Self::MacCatalyst => "mac-catalyst",
        }
    }

    /// Parse a configuration name.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ios" | "iphoneos" => Ok(Self::Ios),
            "ios-simulator" | "iphonesimulator" => Ok(Self::IosSimulator),
            "macos" | "macosx" => Ok(Self::Macos),
            "mac-catalyst" | "maccatalyst" => Ok(Self::MacCatalyst),
            other => Err(TargetError::UnknownOs { name: other.into() }),
        }
    }

    /// Value for `CMAKE_SYSTEM_NAME`.
    pub fn cmake_system_name(&self) -> &'static str {
        match self {
            Self::Ios | Self::IosSimulator => "iOS",
            Self::Macos | Self::MacCatalyst => "Darwin",
        }
    }

    /// SDK name passed as `CMAKE_OSX_SYSROOT`.
    pub fn sdk(&self) -> &'static str {
        match self {
            Self::Ios => "iphoneos",
            Self::IosSimulator => "iphonesimulator",
            Self::Macos | Self::MacCatalyst => "macosx",
        }
    }

    /// XCFramework `SupportedPlatform` value.
    pub fn platform(&self) -> &'static str {
        match self {
            Self::Ios | Self::IosSimulator | Self::MacCatalyst => "ios",
            Self::Macos => "macos",
        }
    }

    /// XCFramework `SupportedPlatformVariant` value, if any.
    pub fn variant(&self) -> Option<&'static str> {
        match self {
            Self::IosSimulator => Some("simulator"),
            Self::MacCatalyst => Some("maccatalyst"),
            Self::Ios | Self::Macos => None,
        }
    }

    /// `CFBundleSupportedPlatforms` tag for flat-layout bundles.
    pub fn bundle_platform_tag(&self) -> &'static str {
        match self {
            Self::Ios => "iPhoneOS",
            Self::IosSimulator => "iPhoneSimulator",
            Self::Macos | Self::MacCatalyst => "MacOSX",
        }
    }

    /// Framework layout convention for this family.
    pub fn layout(&self) -> BundleLayoutKind {
        match self {
            Self::Ios | Self::IosSimulator => BundleLayoutKind::Flat,
            Self::Macos | Self::MacCatalyst => BundleLayoutKind::Versioned,
        }
    }

    /// Architectures a slice may be built for on this family.
    pub fn supported_archs(&self) -> &'static [Arch] {
        match self {
            Self::Ios => &[Arch::Arm64],
            Self::IosSimulator | Self::Macos | Self::MacCatalyst => &Arch::ALL,
        }
    }

    /// Lowest deployment target the toolchain still accepts.
    pub fn minimum_supported_version(&self) -> &'static str {
        match self {
            Self::Ios | Self::IosSimulator => "12.0",
            Self::Macos => "10.13",
            Self::MacCatalyst => "13.1",
        }
    }

    /// Clang target triple for one slice of this family.
    pub fn clang_target(&self, arch: Arch, min_os_version: &str) -> String {
        match self {
            Self::Ios => format!("{arch}-apple-ios{min_os_version}"),
            Self::IosSimulator => format!("{arch}-apple-ios{min_os_version}-simulator"),
            Self::Macos => format!("{arch}-apple-macos{min_os_version}"),
            Self::MacCatalyst => format!("{arch}-apple-ios{min_os_version}-macabi"),
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

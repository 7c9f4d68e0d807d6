//! Descriptive metadata written into each bundle.

use nativepack_targets::{BundleLayoutKind, PlatformTarget};
use serde::{Deserialize, Serialize};

use super::plist::Plist;

/// Values for a framework bundle's Info.plist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Framework (and binary) name, e.g. `H3`.
    pub executable: String,
    /// Reverse-DNS bundle identifier.
    pub identifier: String,
    pub display_name: String,
    /// Marketing version (`CFBundleShortVersionString`).
    pub short_version: String,
    /// Build version (`CFBundleVersion`).
    pub version: String,
}

impl BundleMetadata {
    /// Metadata using one version string for both version keys.
    pub fn new(framework_name: &str, identifier: &str, version: &str) -> Self {
        Self {
            executable: framework_name.to_string(),
            identifier: identifier.to_string(),
            display_name: framework_name.to_string(),
            short_version: version.to_string(),
            version: version.to_string(),
        }
    }

    /// Check every field against the rules the loader and App Store apply.
    pub fn validate(&self) -> Result<(), String> {
        if self.executable.is_empty()
            || !self
                .executable
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("'{}' is not a valid framework name", self.executable));
        }
        let id_ok = !self.identifier.is_empty()
            && self.identifier.split('.').all(|part| {
                !part.is_empty()
                    && part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-')
            });
        if !id_ok {
            return Err(format!("'{}' is not a valid bundle identifier", self.identifier));
        }
        for (key, value) in [
            ("CFBundleShortVersionString", &self.short_version),
            ("CFBundleVersion", &self.version),
        ] {
            if !is_numeric_version(value) {
                return Err(format!(
                    "{key} '{value}' must be one to three period-separated integers"
                ));
            }
        }
        Ok(())
    }

    /// The bundle's Info.plist for `target`.
    pub fn info_plist(&self, target: &PlatformTarget) -> Plist {
        let mut entries = vec![
            ("CFBundleDevelopmentRegion", Plist::string("en")),
            ("CFBundleExecutable", Plist::string(&self.executable)),
            ("CFBundleIdentifier", Plist::string(&self.identifier)),
            ("CFBundleInfoDictionaryVersion", Plist::string("6.0")),
            ("CFBundleName", Plist::string(&self.display_name)),
            ("CFBundlePackageType", Plist::string("FMWK")),
            ("CFBundleShortVersionString", Plist::string(&self.short_version)),
            ("CFBundleVersion", Plist::string(&self.version)),
        ];
        if target.layout() == BundleLayoutKind::Flat {
            entries.push((
                "CFBundleSupportedPlatforms",
                Plist::Array(vec![Plist::string(target.os().bundle_platform_tag())]),
            ));
            entries.push(("MinimumOSVersion", Plist::string(target.min_os_version())));
            entries.push((
                "UIDeviceFamily",
                Plist::Array(vec![Plist::Integer(1), Plist::Integer(2)]),
            ));
        }
        Plist::dict(entries)
    }
}

fn is_numeric_version(v: &str) -> bool {
    let parts: Vec<&str> = v.split('.').collect();
    (1..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Clang module map exposing `umbrella` as the framework's umbrella header.
pub fn module_map(framework_name: &str, umbrella: &str) -> String {
    format!(
        "framework module {framework_name} {{\n    umbrella header \"{umbrella}\"\n\n    export *\n    module * {{ export * }}\n}}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::plist::lookup_string;

    #[test]
    fn flat_plist_carries_platform_keys() {
        let meta = BundleMetadata::new("H3", "org.example.h3", "4.1.0");
        let target = PlatformTarget::ios_simulator("12.0").unwrap();
        let plist = meta.info_plist(&target);
        assert_eq!(plist.get_string("CFBundlePackageType"), Some("FMWK"));
        assert_eq!(plist.get_string("MinimumOSVersion"), Some("12.0"));
        let xml = plist.to_xml();
        assert!(xml.contains("<string>iPhoneSimulator</string>"));
        assert_eq!(lookup_string(&xml, "CFBundleExecutable").as_deref(), Some("H3"));
    }

    #[test]
    fn versioned_plist_omits_platform_keys() {
        let meta = BundleMetadata::new("H3", "org.example.h3", "4.1.0");
        let plist = meta.info_plist(&PlatformTarget::macos("10.15").unwrap());
        assert_eq!(plist.get_string("MinimumOSVersion"), None);
        assert!(!plist.to_xml().contains("UIDeviceFamily"));
    }

    #[test]
    fn validation() {
        assert!(BundleMetadata::new("H3", "org.example.h3", "4.1.0").validate().is_ok());
        assert!(BundleMetadata::new("H3", "org..h3", "4.1.0").validate().is_err());
        assert!(BundleMetadata::new("H3", "org.example.h3", "4.1.0-beta").validate().is_err());
        assert!(BundleMetadata::new("H 3", "org.example.h3", "4").validate().is_err());
    }

    #[test]
    fn module_map_names_umbrella() {
        let map = module_map("H3", "h3api.h");
        assert!(map.starts_with("framework module H3 {"));
        assert!(map.contains("umbrella header \"h3api.h\""));
    }
}

//! On-disk shapes of a framework bundle.

use std::path::{Path, PathBuf};

use nativepack_targets::{BundleLayoutKind, PlatformTarget};
use nativepack_toolchain::{Toolchain, ToolchainError, RPATH_TOKEN};
use serde::{Deserialize, Serialize};

use crate::fsutil::symlink;

/// Version directory used for versioned bundles.
pub const DEFAULT_VERSION: &str = "A";

/// Entries a versioned bundle exposes at its root through `Versions/Current`.
const ROOT_LINKS: &[&str] = &["Headers", "Modules", "Resources"];

/// Framework bundle layout.
///
/// `Flat` keeps binary, headers and Info.plist at the bundle root (iOS and
/// the simulator). `Versioned` keeps everything under `Versions/<version>`
/// with root-level symlinks through `Versions/Current` (macOS and Catalyst).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FrameworkLayout {
    Flat,
    Versioned { version: String },
}

impl FrameworkLayout {
    /// Layout the target's OS family requires.
    pub fn for_target(target: &PlatformTarget) -> Self {
        match target.layout() {
            BundleLayoutKind::Flat => Self::Flat,
            BundleLayoutKind::Versioned => Self::Versioned {
                version: DEFAULT_VERSION.to_string(),
            },
        }
    }

    pub fn kind(&self) -> BundleLayoutKind {
        match self {
            Self::Flat => BundleLayoutKind::Flat,
            Self::Versioned { .. } => BundleLayoutKind::Versioned,
        }
    }

    /// Directory holding the real (non-symlink) bundle contents.
    fn content_dir(&self) -> PathBuf {
        match self {
            Self::Flat => PathBuf::new(),
            Self::Versioned { version } => Path::new("Versions").join(version),
        }
    }

    /// Binary path relative to the bundle root.
    pub fn binary_rel(&self, name: &str) -> PathBuf {
        self.content_dir().join(name)
    }

    pub fn binary_path(&self, root: &Path, name: &str) -> PathBuf {
        root.join(self.binary_rel(name))
    }

    pub fn headers_dir(&self, root: &Path) -> PathBuf {
        root.join(self.content_dir()).join("Headers")
    }

    pub fn modules_dir(&self, root: &Path) -> PathBuf {
        root.join(self.content_dir()).join("Modules")
    }

    pub fn resources_dir(&self, root: &Path) -> PathBuf {
        match self {
            Self::Flat => root.to_path_buf(),
            Self::Versioned { .. } => root.join(self.content_dir()).join("Resources"),
        }
    }

    pub fn info_plist_path(&self, root: &Path) -> PathBuf {
        self.resources_dir(root).join("Info.plist")
    }

    /// The binary's expected install name, rooted at the runtime search path.
    pub fn install_name(&self, name: &str) -> String {
        format!(
            "{RPATH_TOKEN}/{name}.framework/{}",
            self.binary_rel(name).display()
        )
    }

    /// Create the empty directory skeleton under `root`.
    pub fn create_skeleton(&self, root: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(self.headers_dir(root))?;
        std::fs::create_dir_all(self.resources_dir(root))?;
        Ok(())
    }

    /// Create `Versions/Current` and the root-level links. No-op for flat bundles.
    pub fn link_current(&self, root: &Path, name: &str) -> std::io::Result<()> {
        let Self::Versioned { version } = self else {
            return Ok(());
        };
        symlink(Path::new(version), &root.join("Versions").join("Current"))?;

        let current = Path::new("Versions").join("Current");
        symlink(&current.join(name), &root.join(name))?;
        for entry in ROOT_LINKS {
            if root.join(self.content_dir()).join(entry).exists() {
                symlink(&current.join(entry), &root.join(entry))?;
            }
        }
        Ok(())
    }

    /// Point the binary's own install name at its location inside the bundle,
    /// then read it back. Returns the install name now embedded.
    pub fn rewrite_self_reference(
        &self,
        toolchain: &dyn Toolchain,
        binary: &Path,
        name: &str,
    ) -> nativepack_toolchain::Result<String> {
        let expected = self.install_name(name);
        toolchain.set_install_name(binary, &expected)?;
        match toolchain.install_name(binary)? {
            Some(actual) if actual == expected => Ok(actual),
            other => Err(ToolchainError::UnexpectedOutput {
                tool: "install_name_tool".into(),
                detail: format!(
                    "install name reads back as {} instead of {expected}",
                    other.as_deref().unwrap_or("<none>")
                ),
            }),
        }
    }

    /// Relative paths a complete bundle must contain.
    pub fn required_entries(&self, name: &str) -> Vec<PathBuf> {
        let mut entries = vec![
            self.binary_rel(name),
            self.content_dir().join("Headers"),
        ];
        match self {
            Self::Flat => entries.push(PathBuf::from("Info.plist")),
            Self::Versioned { .. } => {
                entries.push(self.content_dir().join("Resources").join("Info.plist"));
                entries.push(PathBuf::from("Versions/Current"));
                entries.push(PathBuf::from(name));
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativepack_toolchain::mock::MockToolchain;

    #[test]
    fn flat_paths() {
        let layout = FrameworkLayout::for_target(&PlatformTarget::ios_device("12.0").unwrap());
        let root = Path::new("/p/H3.framework");
        assert_eq!(layout, FrameworkLayout::Flat);
        assert_eq!(layout.binary_path(root, "H3"), root.join("H3"));
        assert_eq!(layout.info_plist_path(root), root.join("Info.plist"));
        assert_eq!(layout.install_name("H3"), "@rpath/H3.framework/H3");
    }

    #[test]
    fn versioned_paths() {
        let layout = FrameworkLayout::for_target(&PlatformTarget::macos("10.15").unwrap());
        let root = Path::new("/p/H3.framework");
        assert_eq!(layout.binary_path(root, "H3"), root.join("Versions/A/H3"));
        assert_eq!(
            layout.info_plist_path(root),
            root.join("Versions/A/Resources/Info.plist")
        );
        assert_eq!(
            layout.install_name("H3"),
            "@rpath/H3.framework/Versions/A/H3"
        );
    }

    #[cfg(unix)]
    #[test]
    fn versioned_links_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("H3.framework");
        let layout = FrameworkLayout::Versioned {
            version: "A".into(),
        };
        layout.create_skeleton(&root).unwrap();
        std::fs::write(layout.binary_path(&root, "H3"), "bin").unwrap();
        std::fs::write(layout.info_plist_path(&root), "<plist/>").unwrap();
        layout.link_current(&root, "H3").unwrap();

        assert_eq!(std::fs::read_to_string(root.join("H3")).unwrap(), "bin");
        assert!(root.join("Headers").is_dir());
        assert!(root.join("Resources").is_dir());
        assert!(!root.join("Modules").exists());
        assert_eq!(
            std::fs::read_link(root.join("Versions/Current")).unwrap(),
            PathBuf::from("A")
        );
        for entry in layout.required_entries("H3") {
            assert!(root.join(&entry).exists(), "{entry:?}");
        }
    }

    #[test]
    fn rewrite_detects_ignored_rewrite() {
        use nativepack_targets::Arch;
        use nativepack_toolchain::{CompileRequest, Linkage};
        use std::collections::BTreeMap;

        let dir = tempfile::tempdir().unwrap();
        let tc = MockToolchain::new(["f"]).keeping_absolute_install_names();
        let target = PlatformTarget::ios_device("12.0").unwrap();
        let bin = tc
            .compile(&CompileRequest {
                target: target.clone(),
                arch: Arch::Arm64,
                library_name: "h3".into(),
                source_dir: dir.path().join("src"),
                build_dir: dir.path().join("build"),
                output_dir: dir.path().join("out"),
                linkage: Linkage::Dynamic,
                defines: BTreeMap::new(),
            })
            .unwrap();

        let err = FrameworkLayout::Flat
            .rewrite_self_reference(&tc, &bin, "H3")
            .unwrap_err();
        assert!(err.to_string().contains("@rpath/H3.framework/H3"));

        let ok = MockToolchain::new(["f"]);
        assert_eq!(
            FrameworkLayout::Flat
                .rewrite_self_reference(&ok, &bin, "H3")
                .unwrap(),
            "@rpath/H3.framework/H3"
        );
    }
}

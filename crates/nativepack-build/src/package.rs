//! Multi-platform package (XCFramework) aggregation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nativepack_targets::{Arch, PlatformTarget};
use nativepack_toolchain::Toolchain;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::SymbolExportRecord;
use crate::bundle::plist::Plist;
use crate::bundle::{FrameworkBundle, FrameworkLayout};
use crate::error::{PipelineError, Result};
use crate::fsutil::{copy_tree, remove_dir_if_exists, sha256_file};

/// Current `manifest.json` format.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// File name of the package manifest at the package root.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One packaged target as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedTarget {
    pub identifier: String,
    pub target: PlatformTarget,
    pub layout: FrameworkLayout,
    /// Bundle directory relative to the package root.
    pub bundle_path: PathBuf,
    /// Binary relative to the package root.
    pub binary_path: PathBuf,
    pub install_name: Option<String>,
    /// Hex SHA-256 of the binary.
    pub sha256: String,
    /// Number of distinct names in the dynamic symbol table.
    pub exported_symbols: usize,
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub format_version: u32,
    pub framework_name: String,
    pub library_version: String,
    pub source_revision: Option<String>,
    pub targets: Vec<PackagedTarget>,
}

/// A finished package on disk.
#[derive(Debug, Clone)]
pub struct MultiPlatformPackage {
    pub root: PathBuf,
    pub manifest: PackageManifest,
}

impl MultiPlatformPackage {
    /// Load a package from its manifest.
    pub fn open(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let bytes = std::fs::read(&path).map_err(|e| PipelineError::Packaging {
            detail: format!("{}: {e}", path.display()),
        })?;
        let manifest: PackageManifest = serde_json::from_slice(&bytes)?;
        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(PipelineError::Packaging {
                detail: format!(
                    "unsupported manifest format {} (expected {MANIFEST_FORMAT_VERSION})",
                    manifest.format_version
                ),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
        })
    }

    /// The single packaged entry for `identifier`.
    pub fn bundle_for(&self, identifier: &str) -> Result<&PackagedTarget> {
        let mut matches = self
            .manifest
            .targets
            .iter()
            .filter(|t| t.identifier == identifier);
        match (matches.next(), matches.next()) {
            (Some(entry), None) => Ok(entry),
            (None, _) => Err(PipelineError::Packaging {
                detail: format!("no bundle for {identifier}"),
            }),
            (Some(_), Some(_)) => Err(PipelineError::Packaging {
                detail: format!("more than one bundle for {identifier}"),
            }),
        }
    }

    pub fn target_ids(&self) -> Vec<&str> {
        self.manifest
            .targets
            .iter()
            .map(|t| t.identifier.as_str())
            .collect()
    }

    pub fn bundle_root(&self, entry: &PackagedTarget) -> PathBuf {
        self.root.join(&entry.bundle_path)
    }

    pub fn binary_path(&self, entry: &PackagedTarget) -> PathBuf {
        self.root.join(&entry.binary_path)
    }

    pub fn info_plist_path(&self) -> PathBuf {
        self.root.join("Info.plist")
    }
}

/// Naming and provenance for a package.
#[derive(Debug, Clone)]
pub struct PackageRequest {
    pub framework_name: String,
    pub library_version: String,
    pub source_revision: Option<String>,
    /// The package is written to `<out_dir>/<Name>.xcframework`.
    pub out_dir: PathBuf,
}

impl PackageRequest {
    pub fn package_path(&self) -> PathBuf {
        self.out_dir
            .join(format!("{}.xcframework", self.framework_name))
    }
}

/// Check that bundles map one-to-one onto the configured targets and return
/// them in configuration order.
fn match_bundles<'a>(
    targets: &[PlatformTarget],
    bundles: &'a [FrameworkBundle],
) -> Result<Vec<&'a FrameworkBundle>> {
    let mut by_id: BTreeMap<String, Vec<&FrameworkBundle>> = BTreeMap::new();
    for bundle in bundles {
        by_id.entry(bundle.identifier()).or_default().push(bundle);
    }

    let mut problems = Vec::new();
    let mut ordered = Vec::with_capacity(targets.len());
    for target in targets {
        let id = target.identifier();
        match by_id.remove(&id).as_deref() {
            None | Some([]) => problems.push(format!("missing bundle for {id}")),
            Some([one]) => ordered.push(*one),
            Some(many) => problems.push(format!("{} bundles for {id}", many.len())),
        }
    }
    for id in by_id.keys() {
        problems.push(format!("bundle {id} has no configured target"));
    }

    if problems.is_empty() {
        Ok(ordered)
    } else {
        Err(PipelineError::Packaging {
            detail: problems.join("; "),
        })
    }
}

fn xcframework_plist(framework_name: &str, entries: &[PackagedTarget]) -> Plist {
    let libraries = entries
        .iter()
        .map(|entry| {
            let os = entry.target.os();
            let archs = entry
                .target
                .archs()
                .iter()
                .map(|a: &Arch| Plist::string(a.name()))
                .collect();
            let mut lib = vec![
                (
                    "BinaryPath",
                    Plist::string(format!(
                        "{framework_name}.framework/{}",
                        entry.layout.binary_rel(framework_name).display()
                    )),
                ),
                ("LibraryIdentifier", Plist::string(&entry.identifier)),
                ("LibraryPath", Plist::string(format!("{framework_name}.framework"))),
                ("SupportedArchitectures", Plist::Array(archs)),
                ("SupportedPlatform", Plist::string(os.platform())),
            ];
            if let Some(variant) = os.variant() {
                lib.push(("SupportedPlatformVariant", Plist::string(variant)));
            }
            Plist::dict(lib)
        })
        .collect();

    Plist::dict([
        ("AvailableLibraries", Plist::Array(libraries)),
        ("CFBundlePackageType", Plist::string("XFWK")),
        ("XCFrameworkFormatVersion", Plist::string("1.0")),
    ])
}

fn stage(
    toolchain: &dyn Toolchain,
    bundles: &[&FrameworkBundle],
    request: &PackageRequest,
    staging: &Path,
) -> Result<PackageManifest> {
    let name = &request.framework_name;
    let mut entries = Vec::with_capacity(bundles.len());
    for bundle in bundles {
        let id = bundle.identifier();
        let bundle_path = PathBuf::from(&id).join(format!("{name}.framework"));
        copy_tree(&bundle.root, &staging.join(&bundle_path))?;

        let binary_path = bundle_path.join(bundle.layout.binary_rel(name));
        let staged = staging.join(&binary_path);
        let exported =
            SymbolExportRecord::collect(toolchain, &bundle.target, &staged, bundle.target.archs())?;
        debug!(target = %id, symbols = exported.len(), "staged bundle");

        entries.push(PackagedTarget {
            identifier: id,
            target: bundle.target.clone(),
            layout: bundle.layout.clone(),
            bundle_path,
            binary_path,
            install_name: bundle.install_name.clone(),
            sha256: sha256_file(&staged)?,
            exported_symbols: exported.len(),
        });
    }

    std::fs::write(
        staging.join("Info.plist"),
        xcframework_plist(name, &entries).to_xml(),
    )?;
    let manifest = PackageManifest {
        format_version: MANIFEST_FORMAT_VERSION,
        framework_name: name.clone(),
        library_version: request.library_version.clone(),
        source_revision: request.source_revision.clone(),
        targets: entries,
    };
    std::fs::write(
        staging.join(MANIFEST_FILE),
        serde_json::to_vec_pretty(&manifest)?,
    )?;
    Ok(manifest)
}

/// Aggregate one bundle per configured target into a multi-platform package.
///
/// The package is built in a staging directory next to its final location and
/// renamed into place only once complete.
pub fn package(
    toolchain: &dyn Toolchain,
    targets: &[PlatformTarget],
    bundles: &[FrameworkBundle],
    request: &PackageRequest,
) -> Result<MultiPlatformPackage> {
    let ordered = match_bundles(targets, bundles)?;

    std::fs::create_dir_all(&request.out_dir)?;
    let root = request.package_path();
    let staging = request.out_dir.join(format!(
        ".{}.xcframework.staging-{}",
        request.framework_name,
        uuid::Uuid::new_v4().simple()
    ));

    let manifest = match stage(toolchain, &ordered, request, &staging) {
        Ok(manifest) => manifest,
        Err(e) => {
            remove_dir_if_exists(&staging)?;
            return Err(e);
        }
    };

    remove_dir_if_exists(&root)?;
    std::fs::rename(&staging, &root)?;
    info!(package = %root.display(), targets = manifest.targets.len(), "package written");
    Ok(MultiPlatformPackage { root, manifest })
}

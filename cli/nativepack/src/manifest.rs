//! `nativepack.toml` manifest parsing and project configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nativepack_build::{HeaderSet, PipelineConfig, SourceConfig, VerifyConfig};
use nativepack_targets::PlatformTarget;
use nativepack_toolchain::{Linkage, SourcePin};
use serde::{Deserialize, Serialize};

/// Manifest file name searched for from the working directory upward.
pub const MANIFEST_FILE: &str = "nativepack.toml";

/// Scratch directory for build trees, slices and bundles.
pub const WORK_DIR: &str = ".nativepack";

/// Default output directory for the finished package.
pub const DEFAULT_OUT_DIR: &str = "dist";

/// The top-level manifest structure for a nativepack project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub library: LibraryConfig,
    pub source: SourceSection,
    pub headers: HeadersSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub signing: SigningSection,
    pub verify: VerifySection,
    /// Explicit target set. Empty means the built-in Apple set.
    #[serde(default)]
    pub targets: Vec<PlatformTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LibraryConfig {
    /// CMake library target; the build produces `lib<name>.dylib`.
    pub name: String,
    /// Framework and binary name. Defaults to `name`.
    #[serde(default)]
    pub framework_name: Option<String>,
    pub bundle_identifier: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    pub path: PathBuf,
    #[serde(default)]
    pub repository: Option<String>,
    /// Tag or commit; required together with `repository`.
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadersSection {
    pub dir: PathBuf,
    #[serde(default)]
    pub umbrella: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default)]
    pub linkage: Linkage,
    #[serde(default)]
    pub defines: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningSection {
    #[serde(default = "default_identity")]
    pub identity: String,
}

impl Default for SigningSection {
    fn default() -> Self {
        Self {
            identity: default_identity(),
        }
    }
}

fn default_identity() -> String {
    "-".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VerifySection {
    pub smoke_symbol: String,
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl ProjectManifest {
    /// Search upward from `start_dir` for a `nativepack.toml` file, parse and
    /// return it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(MANIFEST_FILE);
            if candidate.is_file() {
                let manifest = Self::load(&candidate)?;
                return Ok(Some((manifest, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Load a manifest from an explicit path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse a manifest from a TOML string.
    pub fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing nativepack.toml")
    }

    pub fn framework_name(&self) -> &str {
        self.library
            .framework_name
            .as_deref()
            .unwrap_or(&self.library.name)
    }

    /// Configured targets, or the built-in Apple set when none are listed.
    pub fn targets(&self) -> Vec<PlatformTarget> {
        if self.targets.is_empty() {
            PlatformTarget::apple_defaults()
        } else {
            self.targets.clone()
        }
    }

    pub fn verify_config(&self) -> VerifyConfig {
        VerifyConfig {
            smoke_symbol: self.verify.smoke_symbol.clone(),
            required_symbols: self.verify.symbols.clone(),
            expected_targets: self.targets(),
        }
    }

    /// Where `build` writes the package unless told otherwise.
    pub fn default_package_path(&self, project_dir: &Path) -> PathBuf {
        project_dir
            .join(DEFAULT_OUT_DIR)
            .join(format!("{}.xcframework", self.framework_name()))
    }

    fn source_pin(&self) -> Result<Option<SourcePin>> {
        match (&self.source.repository, &self.source.reference) {
            (Some(repository), Some(reference)) => Ok(Some(SourcePin {
                repository: repository.clone(),
                reference: reference.clone(),
            })),
            (Some(_), None) => bail!("[source] repository is set but reference is missing"),
            (None, Some(_)) => bail!("[source] reference is set but repository is missing"),
            (None, None) => Ok(None),
        }
    }

    /// Build the pipeline configuration for this project.
    ///
    /// Relative paths resolve against `project_dir`. `only` restricts the run
    /// to the named target identifiers; every name must be configured.
    pub fn to_pipeline_config(
        &self,
        project_dir: &Path,
        out_dir: Option<&Path>,
        only: &[String],
        fetch: bool,
    ) -> Result<PipelineConfig> {
        let mut targets = self.targets();
        if !only.is_empty() {
            for id in only {
                if !targets.iter().any(|t| &t.identifier() == id) {
                    bail!(
                        "unknown target: '{id}'. Use 'nativepack target list' to see configured targets."
                    );
                }
            }
            targets.retain(|t| only.contains(&t.identifier()));
        }

        let verify = self.verify_config().expecting(&targets);
        Ok(PipelineConfig {
            library_name: self.library.name.clone(),
            framework_name: self.framework_name().to_string(),
            bundle_identifier: self.library.bundle_identifier.clone(),
            library_version: self.library.version.clone(),
            source: SourceConfig {
                dir: project_dir.join(&self.source.path),
                pin: self.source_pin()?,
            },
            fetch,
            targets,
            linkage: self.build.linkage,
            defines: self.build.defines.clone(),
            headers: HeaderSet {
                dir: project_dir.join(&self.headers.dir),
                umbrella: self.headers.umbrella.clone(),
            },
            signing_identity: self.signing.identity.clone(),
            verify,
            work_dir: project_dir.join(WORK_DIR),
            out_dir: out_dir
                .map(|p| project_dir.join(p))
                .unwrap_or_else(|| project_dir.join(DEFAULT_OUT_DIR)),
        })
    }

    /// Generate the default template for `nativepack init`.
    pub fn template(name: &str) -> String {
        let framework = framework_name_for(name);
        format!(
            r#"[library]
name = "{name}"
framework-name = "{framework}"
bundle-identifier = "org.example.{name}"
version = "0.1.0"

[source]
path = "vendor/{name}"
# repository = "https://example.com/{name}.git"
# reference = "v0.1.0"

[headers]
dir = "vendor/{name}/include"

[build]
linkage = "dynamic"

[signing]
identity = "-"

[verify]
# A routine every consumer calls; checked first in every bundle.
smoke-symbol = "{name}_version"
symbols = []
"#
        )
    }
}

/// `h3` -> `H3`, `sqlite-vec` -> `SqliteVec`.
fn framework_name_for(name: &str) -> String {
    name.split(|c: char| c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativepack_targets::OsFamily;

    const FULL: &str = r#"
[library]
name = "h3"
framework-name = "H3"
bundle-identifier = "org.example.h3"
version = "4.1.0"

[source]
path = "vendor/h3"
repository = "https://github.com/uber/h3.git"
reference = "v4.1.0"

[headers]
dir = "vendor/h3/src/h3lib/include"
umbrella = "h3api.h"

[build]
linkage = "static"
defines = { BUILD_TESTING = "OFF" }

[signing]
identity = "Apple Development"

[verify]
smoke-symbol = "latLngToCell"
symbols = ["cellToLatLng", "getResolution"]

[[targets]]
os = "ios"
archs = ["arm64"]
min-os-version = "13.0"

[[targets]]
os = "macos"
archs = ["arm64", "x86_64"]
min-os-version = "11.0"
"#;

    const MINIMAL: &str = r#"
[library]
name = "h3"
bundle-identifier = "org.example.h3"
version = "4.1.0"

[source]
path = "h3"

[headers]
dir = "h3/include"

[verify]
smoke-symbol = "latLngToCell"
"#;

    #[test]
    fn parse_full_manifest() {
        let manifest = ProjectManifest::from_str(FULL).unwrap();
        assert_eq!(manifest.framework_name(), "H3");
        assert_eq!(manifest.build.linkage, Linkage::Static);
        assert_eq!(manifest.build.defines["BUILD_TESTING"], "OFF");
        assert_eq!(manifest.signing.identity, "Apple Development");
        assert_eq!(manifest.headers.umbrella.as_deref(), Some("h3api.h"));

        let targets = manifest.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].os(), OsFamily::Ios);
        assert_eq!(targets[1].identifier(), "macos-arm64_x86_64");
    }

    #[test]
    fn parse_minimal_manifest() {
        let manifest = ProjectManifest::from_str(MINIMAL).unwrap();
        assert_eq!(manifest.framework_name(), "h3");
        assert_eq!(manifest.build.linkage, Linkage::Dynamic);
        assert_eq!(manifest.signing.identity, "-");
        assert!(manifest.verify.symbols.is_empty());
        assert_eq!(manifest.targets(), PlatformTarget::apple_defaults());
    }

    #[test]
    fn reject_unsupported_target() {
        let bad = format!("{MINIMAL}\n[[targets]]\nos = \"ios\"\narchs = [\"x86_64\"]\nmin-os-version = \"12.0\"\n");
        assert!(ProjectManifest::from_str(&bad).is_err());
    }

    #[test]
    fn reject_invalid_toml() {
        assert!(ProjectManifest::from_str("[library\nname = ").is_err());
    }

    #[test]
    fn pipeline_config_resolves_paths() {
        let manifest = ProjectManifest::from_str(FULL).unwrap();
        let root = Path::new("/work/h3-pack");
        let cfg = manifest.to_pipeline_config(root, None, &[], true).unwrap();

        assert_eq!(cfg.source.dir, root.join("vendor/h3"));
        assert_eq!(cfg.source.pin.as_ref().unwrap().reference, "v4.1.0");
        assert_eq!(cfg.headers.dir, root.join("vendor/h3/src/h3lib/include"));
        assert_eq!(cfg.work_dir, root.join(WORK_DIR));
        assert_eq!(cfg.package_path(), root.join("dist/H3.xcframework"));
        assert_eq!(cfg.package_path(), manifest.default_package_path(root));
        assert_eq!(
            cfg.verify.all_symbols(),
            vec!["latLngToCell", "cellToLatLng", "getResolution"]
        );
        assert!(cfg.fetch);
    }

    #[test]
    fn pipeline_config_filters_targets() {
        let manifest = ProjectManifest::from_str(MINIMAL).unwrap();
        let root = Path::new("/p");
        let only = vec!["ios-arm64".to_string()];
        let cfg = manifest
            .to_pipeline_config(root, Some(Path::new("out")), &only, false)
            .unwrap();
        assert_eq!(cfg.targets.len(), 1);
        assert_eq!(cfg.targets[0].identifier(), "ios-arm64");
        assert_eq!(cfg.verify.expected_targets, cfg.targets);
        assert_eq!(cfg.out_dir, root.join("out"));
        assert_eq!(manifest.verify_config().expected_targets.len(), 3);

        let unknown = vec!["watchos-arm64".to_string()];
        let err = manifest
            .to_pipeline_config(root, None, &unknown, false)
            .unwrap_err();
        assert!(err.to_string().contains("watchos-arm64"));
    }

    #[test]
    fn repository_requires_reference() {
        let manifest = ProjectManifest::from_str(&MINIMAL.replace(
            "path = \"h3\"",
            "path = \"h3\"\nrepository = \"https://github.com/uber/h3.git\"",
        ))
        .unwrap();
        let err = manifest
            .to_pipeline_config(Path::new("/p"), None, &[], true)
            .unwrap_err();
        assert!(err.to_string().contains("reference is missing"));
    }

    #[test]
    fn template_is_valid_toml() {
        let manifest = ProjectManifest::from_str(&ProjectManifest::template("sqlite-vec")).unwrap();
        assert_eq!(manifest.library.name, "sqlite-vec");
        assert_eq!(manifest.framework_name(), "SqliteVec");
        assert_eq!(manifest.library.version, "0.1.0");
        assert!(manifest.targets.is_empty());
        assert!(!manifest.verify.smoke_symbol.is_empty());
    }

    #[test]
    fn framework_names() {
        assert_eq!(framework_name_for("h3"), "H3");
        assert_eq!(framework_name_for("sqlite-vec"), "SqliteVec");
        assert_eq!(framework_name_for("my_lib"), "MyLib");
    }

    #[test]
    fn find_and_load_in_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), MINIMAL).unwrap();

        let (manifest, found_dir) = ProjectManifest::find_and_load(dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(manifest.library.name, "h3");
        assert_eq!(found_dir, dir.path());
    }

    #[test]
    fn find_and_load_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), MINIMAL).unwrap();

        let nested = dir.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&nested).unwrap();

        let (_, found_dir) = ProjectManifest::find_and_load(&nested).unwrap().unwrap();
        assert_eq!(found_dir, dir.path());
    }

    #[test]
    fn find_and_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "[library]\nname = 3\n").unwrap();
        let err = ProjectManifest::find_and_load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains(MANIFEST_FILE));
    }
}

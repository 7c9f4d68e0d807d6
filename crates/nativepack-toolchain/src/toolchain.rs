//! The toolchain trait and the request/record types it exchanges.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use nativepack_targets::{Arch, PlatformTarget};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Runtime-search-path token the loader substitutes at load time.
pub const RPATH_TOKEN: &str = "@rpath";

/// How the native library is linked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Shared library with a populated dynamic symbol table.
    #[default]
    Dynamic,
    /// Static archive. Never satisfies symbol-by-name lookup at runtime.
    Static,
}

impl Linkage {
    /// File name CMake produces for library `name`.
    pub fn file_name(&self, name: &str) -> String {
        match self {
            Self::Dynamic => format!("lib{name}.dylib"),
            Self::Static => format!("lib{name}.a"),
        }
    }

    /// Value for `BUILD_SHARED_LIBS`.
    pub fn build_shared_libs(&self) -> &'static str {
        match self {
            Self::Dynamic => "ON",
            Self::Static => "OFF",
        }
    }
}

/// What kind of file a binary turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryKind {
    DynamicLibrary,
    StaticArchive,
    Object,
    Executable,
    Unknown,
}

/// Whether a binary carries a code signature, and whose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// A non-empty signature is present.
    pub signed: bool,
    /// Signing authority (`adhoc` for ad-hoc signatures).
    pub authority: Option<String>,
    /// Code-signing identifier embedded in the signature.
    pub identifier: Option<String>,
}

impl SignatureRecord {
    /// Record for a binary with no signature.
    pub fn unsigned() -> Self {
        Self::default()
    }
}

/// A pinned source reference: repository plus tag or commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePin {
    /// Clone URL.
    pub repository: String,
    /// Tag or commit hash.
    pub reference: String,
}

impl SourcePin {
    /// Whether the reference names a moving branch rather than a fixed point.
    pub fn is_floating(&self) -> bool {
        matches!(
            self.reference.as_str(),
            "" | "HEAD" | "main" | "master" | "develop" | "trunk"
        )
    }

    /// Whether the reference is a full commit hash.
    pub fn is_commit(&self) -> bool {
        self.reference.len() == 40 && self.reference.chars().all(|c| c.is_ascii_hexdigit())
    }
}

/// Everything needed to compile one architecture slice of one target.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Target the slice belongs to.
    pub target: PlatformTarget,
    /// Architecture of this slice.
    pub arch: Arch,
    /// CMake library target name (`lib<name>.dylib`).
    pub library_name: String,
    /// Source tree containing `CMakeLists.txt`.
    pub source_dir: PathBuf,
    /// Isolated CMake build directory for this slice.
    pub build_dir: PathBuf,
    /// Where the library is written.
    pub output_dir: PathBuf,
    /// Requested linkage.
    pub linkage: Linkage,
    /// Extra `-D` cache entries.
    pub defines: BTreeMap<String, String>,
}

impl CompileRequest {
    /// Path the built library is expected at.
    pub fn expected_output(&self) -> PathBuf {
        self.output_dir.join(self.linkage.file_name(&self.library_name))
    }

    /// Install name the compiler is told to embed.
    pub fn install_name(&self) -> String {
        format!("{RPATH_TOKEN}/{}", self.linkage.file_name(&self.library_name))
    }

    /// CMake configure arguments for this slice.
    pub fn cmake_configure_args(&self) -> Vec<String> {
        let os = self.target.os();
        let min = self.target.min_os_version();
        let mut args = vec![
            "-S".to_string(),
            self.source_dir.display().to_string(),
            "-B".to_string(),
            self.build_dir.display().to_string(),
            "-DCMAKE_BUILD_TYPE=Release".to_string(),
            format!("-DCMAKE_SYSTEM_NAME={}", os.cmake_system_name()),
            format!("-DCMAKE_OSX_SYSROOT={}", os.sdk()),
            format!("-DCMAKE_OSX_ARCHITECTURES={}", self.arch),
            format!("-DBUILD_SHARED_LIBS={}", self.linkage.build_shared_libs()),
            format!("-DCMAKE_INSTALL_NAME_DIR={RPATH_TOKEN}"),
            "-DCMAKE_BUILD_WITH_INSTALL_NAME_DIR=ON".to_string(),
            format!("-DCMAKE_LIBRARY_OUTPUT_DIRECTORY={}", self.output_dir.display()),
            format!("-DCMAKE_ARCHIVE_OUTPUT_DIRECTORY={}", self.output_dir.display()),
            format!("-DCMAKE_C_FLAGS=-target {}", os.clang_target(self.arch, min)),
        ];
        if os.variant() != Some("maccatalyst") {
            args.push(format!("-DCMAKE_OSX_DEPLOYMENT_TARGET={min}"));
        }
        for (key, value) in &self.defines {
            args.push(format!("-D{key}={value}"));
        }
        args
    }
}

/// Operations the pipeline performs on sources and binaries.
///
/// Implementations must be shareable across the per-target compile tasks.
pub trait Toolchain: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Fail with [`ToolchainError::MissingTools`](crate::ToolchainError::MissingTools)
    /// if any required tool is absent.
    fn check_environment(&self) -> Result<()>;

    /// Clone `pin` into `dest` and return the checked-out commit.
    fn fetch_source(&self, pin: &SourcePin, dest: &Path) -> Result<String>;

    /// Commit currently checked out in `dir`.
    fn source_revision(&self, dir: &Path) -> Result<String>;

    /// Compile one slice; returns the path of the produced library.
    fn compile(&self, request: &CompileRequest) -> Result<PathBuf>;

    /// Combine single-architecture binaries into one universal binary.
    fn create_universal(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Architecture slices contained in a binary.
    fn architectures(&self, binary: &Path) -> Result<BTreeSet<Arch>>;

    /// Kind of binary (dynamic library, static archive, ...).
    fn binary_kind(&self, binary: &Path) -> Result<BinaryKind>;

    /// Names exported through the dynamic symbol table of one slice.
    /// Empty for anything that is not a dynamic library.
    fn exported_symbols(&self, binary: &Path, arch: Arch) -> Result<BTreeSet<String>>;

    /// Rewrite the binary's own install name.
    fn set_install_name(&self, binary: &Path, install_name: &str) -> Result<()>;

    /// The binary's own install name, if it has one.
    fn install_name(&self, binary: &Path) -> Result<Option<String>>;

    /// Sign a binary in place.
    fn sign(&self, binary: &Path, identity: &str) -> Result<()>;

    /// Inspect a binary's signature.
    fn signature(&self, binary: &Path) -> Result<SignatureRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: PlatformTarget, arch: Arch) -> CompileRequest {
        CompileRequest {
            target,
            arch,
            library_name: "h3".into(),
            source_dir: PathBuf::from("/src/h3"),
            build_dir: PathBuf::from("/work/build/ios-arm64/arm64"),
            output_dir: PathBuf::from("/work/out/ios-arm64/arm64"),
            linkage: Linkage::Dynamic,
            defines: BTreeMap::from([("BUILD_TESTING".to_string(), "OFF".to_string())]),
        }
    }

    #[test]
    fn configure_args_request_shared_rpath_output() {
        let req = request(PlatformTarget::ios_device("12.0").unwrap(), Arch::Arm64);
        let args = req.cmake_configure_args();
        assert!(args.contains(&"-DBUILD_SHARED_LIBS=ON".to_string()));
        assert!(args.contains(&"-DCMAKE_INSTALL_NAME_DIR=@rpath".to_string()));
        assert!(args.contains(&"-DCMAKE_SYSTEM_NAME=iOS".to_string()));
        assert!(args.contains(&"-DCMAKE_OSX_SYSROOT=iphoneos".to_string()));
        assert!(args.contains(&"-DCMAKE_OSX_DEPLOYMENT_TARGET=12.0".to_string()));
        assert!(args.contains(&"-DBUILD_TESTING=OFF".to_string()));
        assert!(args.contains(&"-DCMAKE_C_FLAGS=-target arm64-apple-ios12.0".to_string()));
    }

    #[test]
    fn catalyst_uses_target_triple_not_deployment_target() {
        let req = request(PlatformTarget::mac_catalyst("14.0").unwrap(), Arch::X86_64);
        let args = req.cmake_configure_args();
        assert!(!args.iter().any(|a| a.starts_with("-DCMAKE_OSX_DEPLOYMENT_TARGET")));
        assert!(args.contains(&"-DCMAKE_C_FLAGS=-target x86_64-apple-ios14.0-macabi".to_string()));
    }

    #[test]
    fn static_linkage_paths() {
        let mut req = request(PlatformTarget::ios_device("12.0").unwrap(), Arch::Arm64);
        req.linkage = Linkage::Static;
        assert!(req.expected_output().ends_with("libh3.a"));
        assert!(req
            .cmake_configure_args()
            .contains(&"-DBUILD_SHARED_LIBS=OFF".to_string()));
    }

    #[test]
    fn install_name_uses_rpath() {
        let req = request(PlatformTarget::ios_device("12.0").unwrap(), Arch::Arm64);
        assert_eq!(req.install_name(), "@rpath/libh3.dylib");
    }

    #[test]
    fn floating_references() {
        let pin = |r: &str| SourcePin {
            repository: "https://example.com/h3.git".into(),
            reference: r.into(),
        };
        assert!(pin("main").is_floating());
        assert!(pin("HEAD").is_floating());
        assert!(!pin("v4.1.0").is_floating());
        assert!(pin("5b9ef4e2c4f4cbd5a06b5d0b2e8e5c0f6a0b1c2d").is_commit());
        assert!(!pin("v4.1.0").is_commit());
    }
}

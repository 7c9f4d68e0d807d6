//! Deterministic in-process toolchain double.
//!
//! Binaries are JSON documents describing their kind, architecture slices,
//! per-slice symbols, install name and signature. Every file-level operation
//! (copying into bundles, hashing, symlinking) stays real; only the tools are
//! simulated. Failure modes are switched on with the builder methods so tests
//! can reproduce each error class of the pipeline.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use nativepack_targets::{Arch, OsFamily};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolchainError};
use crate::toolchain::{
    BinaryKind, CompileRequest, Linkage, SignatureRecord, SourcePin, Toolchain,
};

/// One architecture slice of a mock binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockSlice {
    pub arch: Arch,
    pub symbols: BTreeSet<String>,
}

/// On-disk stand-in for a compiled binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockBinary {
    pub kind: BinaryKind,
    pub slices: Vec<MockSlice>,
    pub install_name: Option<String>,
    pub signature: Option<String>,
}

impl MockBinary {
    /// Read a mock binary from disk.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write a mock binary to disk.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Simulated toolchain.
#[derive(Debug, Default)]
pub struct MockToolchain {
    symbols: BTreeSet<String>,
    slice_symbols: HashMap<(OsFamily, Arch), BTreeSet<String>>,
    failing_compiles: HashSet<OsFamily>,
    failing_signs: Vec<String>,
    missing_tools: Vec<String>,
    unsigned: bool,
    keep_absolute_install_names: bool,
    revision: String,
    compiles: AtomicUsize,
}

impl MockToolchain {
    /// A toolchain whose every slice exports `symbols`.
    pub fn new<S: Into<String>>(symbols: impl IntoIterator<Item = S>) -> Self {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            revision: "0000000000000000000000000000000000000000".into(),
            ..Self::default()
        }
    }

    /// Override the exported symbols of one (OS, arch) slice.
    pub fn with_slice_symbols<S: Into<String>>(
        mut self,
        os: OsFamily,
        arch: Arch,
        symbols: impl IntoIterator<Item = S>,
    ) -> Self {
        self.slice_symbols
            .insert((os, arch), symbols.into_iter().map(Into::into).collect());
        self
    }

    /// Make compilation fail for every slice of `os`.
    pub fn failing_compile(mut self, os: OsFamily) -> Self {
        self.failing_compiles.insert(os);
        self
    }

    /// Make signing fail for any binary whose path contains `fragment`.
    pub fn failing_sign(mut self, fragment: impl Into<String>) -> Self {
        self.failing_signs.push(fragment.into());
        self
    }

    /// Report `tool` as absent from the environment.
    pub fn missing_tool(mut self, tool: impl Into<String>) -> Self {
        self.missing_tools.push(tool.into());
        self
    }

    /// Accept `sign` calls without actually signing.
    pub fn without_signing(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Embed absolute build paths as install names and ignore rewrites.
    pub fn keeping_absolute_install_names(mut self) -> Self {
        self.keep_absolute_install_names = true;
        self
    }

    /// Commit reported for fetched sources.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Number of slices compiled so far.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

fn failed(tool: &str, diagnostic: String) -> ToolchainError {
    ToolchainError::ToolFailed {
        tool: tool.into(),
        status: 1,
        diagnostic,
    }
}

impl Toolchain for MockToolchain {
    fn name(&self) -> &str {
        "mock"
    }

    fn check_environment(&self) -> Result<()> {
        if self.missing_tools.is_empty() {
            Ok(())
        } else {
            Err(ToolchainError::MissingTools {
                tools: self.missing_tools.clone(),
            })
        }
    }

    fn fetch_source(&self, _pin: &SourcePin, dest: &Path) -> Result<String> {
        std::fs::create_dir_all(dest)?;
        std::fs::write(
            dest.join("CMakeLists.txt"),
            "cmake_minimum_required(VERSION 3.20)\n",
        )?;
        Ok(self.revision.clone())
    }

    fn source_revision(&self, dir: &Path) -> Result<String> {
        if dir.is_dir() {
            Ok(self.revision.clone())
        } else {
            Err(failed(
                "git",
                format!("fatal: not a git repository: {}", dir.display()),
            ))
        }
    }

    fn compile(&self, request: &CompileRequest) -> Result<PathBuf> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let os = request.target.os();

        if self.failing_compiles.contains(&os) {
            return Err(ToolchainError::ToolFailed {
                tool: "cmake".into(),
                status: 2,
                diagnostic: format!(
                    "{}: error: unknown type name 'H3Index' (target {})",
                    request.source_dir.join("src/h3lib/lib/h3Index.c").display(),
                    os.clang_target(request.arch, request.target.min_os_version()),
                ),
            });
        }

        let symbols = self
            .slice_symbols
            .get(&(os, request.arch))
            .unwrap_or(&self.symbols)
            .clone();
        let output = request.expected_output();
        let (kind, install_name) = match request.linkage {
            Linkage::Dynamic if self.keep_absolute_install_names => {
                (BinaryKind::DynamicLibrary, Some(output.display().to_string()))
            }
            Linkage::Dynamic => (BinaryKind::DynamicLibrary, Some(request.install_name())),
            Linkage::Static => (BinaryKind::StaticArchive, None),
        };

        MockBinary {
            kind,
            slices: vec![MockSlice {
                arch: request.arch,
                symbols,
            }],
            install_name,
            signature: None,
        }
        .write(&output)?;
        Ok(output)
    }

    fn create_universal(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut merged: Option<MockBinary> = None;
        for input in inputs {
            let bin = MockBinary::read(input)?;
            match merged.as_mut() {
                None => merged = Some(bin),
                Some(m) => {
                    for slice in bin.slices {
                        if m.slices.iter().any(|s| s.arch == slice.arch) {
                            return Err(failed(
                                "lipo",
                                format!(
                                    "{} and earlier inputs have the same architecture ({})",
                                    input.display(),
                                    slice.arch
                                ),
                            ));
                        }
                        m.slices.push(slice);
                    }
                }
            }
        }
        let mut merged =
            merged.ok_or_else(|| failed("lipo", "no input files specified".into()))?;
        merged.slices.sort_by_key(|s| s.arch);
        merged.signature = None;
        merged.write(output)
    }

    fn architectures(&self, binary: &Path) -> Result<BTreeSet<Arch>> {
        Ok(MockBinary::read(binary)?
            .slices
            .iter()
            .map(|s| s.arch)
            .collect())
    }

    fn binary_kind(&self, binary: &Path) -> Result<BinaryKind> {
        Ok(MockBinary::read(binary)?.kind)
    }

    fn exported_symbols(&self, binary: &Path, arch: Arch) -> Result<BTreeSet<String>> {
        let bin = MockBinary::read(binary)?;
        if bin.kind != BinaryKind::DynamicLibrary {
            return Ok(BTreeSet::new());
        }
        bin.slices
            .into_iter()
            .find(|s| s.arch == arch)
            .map(|s| s.symbols)
            .ok_or_else(|| ToolchainError::UnexpectedOutput {
                tool: "nm".into(),
                detail: format!("{} has no {arch} slice", binary.display()),
            })
    }

    fn set_install_name(&self, binary: &Path, install_name: &str) -> Result<()> {
        let mut bin = MockBinary::read(binary)?;
        if bin.kind != BinaryKind::DynamicLibrary {
            return Err(failed(
                "install_name_tool",
                format!("{}: input file is not a dynamic library", binary.display()),
            ));
        }
        if self.keep_absolute_install_names {
            return Ok(());
        }
        bin.install_name = Some(install_name.to_string());
        bin.write(binary)
    }

    fn install_name(&self, binary: &Path) -> Result<Option<String>> {
        Ok(MockBinary::read(binary)?.install_name)
    }

    fn sign(&self, binary: &Path, identity: &str) -> Result<()> {
        let shown = binary.display().to_string();
        if self.failing_signs.iter().any(|f| shown.contains(f.as_str())) {
            return Err(failed(
                "codesign",
                format!("{shown}: errSecInternalComponent"),
            ));
        }
        if self.unsigned {
            return Ok(());
        }
        let mut bin = MockBinary::read(binary)?;
        bin.signature = Some(if identity == "-" {
            "adhoc".to_string()
        } else {
            identity.to_string()
        });
        bin.write(binary)
    }

    fn signature(&self, binary: &Path) -> Result<SignatureRecord> {
        let bin = MockBinary::read(binary)?;
        Ok(match bin.signature {
            Some(authority) => SignatureRecord {
                signed: true,
                authority: Some(authority),
                identifier: binary
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned()),
            },
            None => SignatureRecord::unsigned(),
        })
    }
}

//! Toolchain backed by the host's Xcode command-line tools.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use nativepack_targets::Arch;
use tracing::debug;

use crate::error::{Result, ToolchainError};
use crate::parse::{
    parse_codesign_details, parse_lipo_archs, parse_nm_symbols, parse_otool_filetype,
    parse_otool_install_name,
};
use crate::toolchain::{BinaryKind, CompileRequest, SignatureRecord, SourcePin, Toolchain};

/// Tools every pipeline run needs.
pub const REQUIRED_TOOLS: &[&str] = &[
    "cmake",
    "lipo",
    "nm",
    "otool",
    "install_name_tool",
    "codesign",
];

/// Spawns the real tools found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemToolchain {
    /// Also require `git` (only when sources must be fetched).
    pub require_git: bool,
}

impl SystemToolchain {
    /// A toolchain that does not need `git`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A toolchain that also checks for `git`.
    pub fn with_git() -> Self {
        Self { require_git: true }
    }

    /// Report each tool the pipeline may use and where it was found.
    pub fn probe() -> Vec<(&'static str, Option<PathBuf>)> {
        REQUIRED_TOOLS
            .iter()
            .chain(std::iter::once(&"git"))
            .map(|tool| (*tool, which::which(tool).ok()))
            .collect()
    }

    fn run(&self, tool: &str, args: &[String]) -> Result<Output> {
        debug!(tool, args = ?args, "running tool");
        let output = Command::new(tool).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolchainError::MissingTools {
                    tools: vec![tool.to_string()],
                }
            } else {
                ToolchainError::Spawn {
                    tool: tool.to_string(),
                    source: e,
                }
            }
        })?;
        Ok(output)
    }

    /// Run a tool and require a zero exit status.
    fn run_ok(&self, tool: &str, args: &[String]) -> Result<Output> {
        let output = self.run(tool, args)?;
        if !output.status.success() {
            let mut diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
            if diagnostic.trim().is_empty() {
                diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
            }
            return Err(ToolchainError::ToolFailed {
                tool: tool.to_string(),
                status: output.status.code().unwrap_or(-1),
                diagnostic,
            });
        }
        Ok(output)
    }
}

fn path_arg(p: &Path) -> String {
    p.display().to_string()
}

impl Toolchain for SystemToolchain {
    fn name(&self) -> &str {
        "system"
    }

    fn check_environment(&self) -> Result<()> {
        let mut missing: Vec<String> = REQUIRED_TOOLS
            .iter()
            .filter(|tool| which::which(tool).is_err())
            .map(|tool| tool.to_string())
            .collect();
        if self.require_git && which::which("git").is_err() {
            missing.push("git".into());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolchainError::MissingTools { tools: missing })
        }
    }

    fn fetch_source(&self, pin: &SourcePin, dest: &Path) -> Result<String> {
        if pin.is_commit() {
            self.run_ok(
                "git",
                &["clone".into(), pin.repository.clone(), path_arg(dest)],
            )?;
            self.run_ok(
                "git",
                &[
                    "-C".into(),
                    path_arg(dest),
                    "checkout".into(),
                    "--detach".into(),
                    pin.reference.clone(),
                ],
            )?;
        } else {
            self.run_ok(
                "git",
                &[
                    "clone".into(),
                    "--depth".into(),
                    "1".into(),
                    "--branch".into(),
                    pin.reference.clone(),
                    pin.repository.clone(),
                    path_arg(dest),
                ],
            )?;
        }
        self.source_revision(dest)
    }

    fn source_revision(&self, dir: &Path) -> Result<String> {
        let out = self.run_ok(
            "git",
            &["-C".into(), path_arg(dir), "rev-parse".into(), "HEAD".into()],
        )?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    fn compile(&self, request: &CompileRequest) -> Result<PathBuf> {
        std::fs::create_dir_all(&request.build_dir)?;
        std::fs::create_dir_all(&request.output_dir)?;

        self.run_ok("cmake", &request.cmake_configure_args())?;
        self.run_ok(
            "cmake",
            &[
                "--build".into(),
                path_arg(&request.build_dir),
                "--config".into(),
                "Release".into(),
                "--target".into(),
                request.library_name.clone(),
            ],
        )?;

        let produced = request.expected_output();
        if !produced.is_file() {
            return Err(ToolchainError::UnexpectedOutput {
                tool: "cmake".into(),
                detail: format!("build succeeded but {} was not produced", produced.display()),
            });
        }
        Ok(produced)
    }

    fn create_universal(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut args = vec!["-create".to_string()];
        args.extend(inputs.iter().map(|p| path_arg(p)));
        args.push("-output".into());
        args.push(path_arg(output));
        self.run_ok("lipo", &args)?;
        Ok(())
    }

    fn architectures(&self, binary: &Path) -> Result<BTreeSet<Arch>> {
        let out = self.run_ok("lipo", &["-archs".into(), path_arg(binary)])?;
        parse_lipo_archs(&String::from_utf8_lossy(&out.stdout))
    }

    fn binary_kind(&self, binary: &Path) -> Result<BinaryKind> {
        let out = self.run_ok("otool", &["-hv".into(), path_arg(binary)])?;
        Ok(parse_otool_filetype(&String::from_utf8_lossy(&out.stdout)))
    }

    fn exported_symbols(&self, binary: &Path, arch: Arch) -> Result<BTreeSet<String>> {
        // Archives and objects have no dynamic symbol table to look names up in.
        if self.binary_kind(binary)? != BinaryKind::DynamicLibrary {
            return Ok(BTreeSet::new());
        }
        let out = self.run_ok(
            "nm",
            &[
                "-g".into(),
                "-U".into(),
                "-j".into(),
                "-arch".into(),
                arch.name().into(),
                path_arg(binary),
            ],
        )?;
        Ok(parse_nm_symbols(&String::from_utf8_lossy(&out.stdout)))
    }

    fn set_install_name(&self, binary: &Path, install_name: &str) -> Result<()> {
        self.run_ok(
            "install_name_tool",
            &["-id".into(), install_name.into(), path_arg(binary)],
        )?;
        Ok(())
    }

    fn install_name(&self, binary: &Path) -> Result<Option<String>> {
        let out = self.run_ok("otool", &["-D".into(), path_arg(binary)])?;
        Ok(parse_otool_install_name(&String::from_utf8_lossy(&out.stdout)))
    }

    fn sign(&self, binary: &Path, identity: &str) -> Result<()> {
        self.run_ok(
            "codesign",
            &[
                "--force".into(),
                "--sign".into(),
                identity.into(),
                "--timestamp=none".into(),
                path_arg(binary),
            ],
        )?;
        Ok(())
    }

    fn signature(&self, binary: &Path) -> Result<SignatureRecord> {
        // codesign exits non-zero for unsigned code; that is an answer, not a failure.
        let out = self.run("codesign", &["-dvv".into(), path_arg(binary)])?;
        let text = String::from_utf8_lossy(&out.stderr);
        Ok(parse_codesign_details(&text))
    }
}

//! Build, bundle, package and verification pipeline for nativepack.
//!
//! Turns a pinned native source tree into one multi-platform package through a
//! fixed sequence of stages:
//! source acquisition -> per-target compile (parallel) -> universal merge ->
//! bundle assembly -> packaging -> integrity verification gate.
//!
//! Every stage either completes for all configured targets or fails the run;
//! no partially valid package is ever left behind.

pub mod artifact;
pub mod bundle;
pub mod compile;
pub mod error;
pub mod fsutil;
pub mod merge;
pub mod package;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod verify;

pub use artifact::{BuildArtifact, SymbolExportRecord};
pub use bundle::{
    assemble_all, assemble_bundle, AssemblyFailure, AssemblyOptions, AssemblyOutcome,
    AssemblyStep, BundleMetadata, FrameworkBundle, FrameworkLayout, HeaderSet,
};
pub use compile::{compile_all, compile_target, CompileConfig};
pub use error::{PipelineError, Result};
pub use merge::merge_universal;
pub use package::{package, MultiPlatformPackage, PackageManifest, PackageRequest, PackagedTarget};
pub use pipeline::{run_pipeline, PipelineConfig, PipelineOutput};
pub use report::PipelineReport;
pub use source::{ensure_source, SourceConfig};
pub use verify::{
    gate_or_halt, verification_gate, verify_package, CheckKind, CheckResult, GateDecision,
    VerificationReport, VerifyConfig,
};

//! Native toolchain abstraction for nativepack.
//!
//! Every operation the pipeline performs on a binary goes through the
//! [`Toolchain`] trait: compiling a slice, merging slices, reading back
//! architectures, exported symbols and the install name, rewriting the install
//! name, and signing.
//!
//! - [`SystemToolchain`] drives the host tools (`cmake`, `lipo`, `nm`, `otool`,
//!   `install_name_tool`, `codesign`, `git`).
//! - [`mock::MockToolchain`] is a deterministic in-process double that writes
//!   JSON stand-ins for binaries, so pipelines can be exercised on any host.

pub mod error;
pub mod mock;
pub mod parse;
pub mod system;
pub mod toolchain;

pub use error::{Result, ToolchainError};
pub use system::SystemToolchain;
pub use toolchain::{
    BinaryKind, CompileRequest, Linkage, SignatureRecord, SourcePin, Toolchain, RPATH_TOKEN,
};

//! Platform target model definitions and parsing for nativepack.
//!
//! A [`PlatformTarget`] names one (OS family, architecture set, minimum OS
//! version) triple the packaging pipeline must produce an artifact for. The
//! configured set is fixed for a pipeline run and every member must end up
//! with exactly one bundle in the finished package.
//!
//! - [`os`]: OS family and architecture vocabulary
//! - [`platform`]: the `PlatformTarget` triple and built-in presets
//! - [`parse`]: TOML loading, serialization and set validation

pub mod error;
pub mod os;
pub mod parse;
pub mod platform;

pub use error::{Result, TargetError};
pub use os::{Arch, BundleLayoutKind, OsFamily};
pub use parse::{
    load_targets_toml, parse_targets_toml, targets_to_toml, validate_target_set, ValidationIssue,
};
pub use platform::{builtin_presets, parse_os_version, PlatformTarget, TargetSpec};

//! Framework bundle model and assembly.
//!
//! A bundle is the OS-specific directory package wrapping one target's binary
//! with its headers, module map and Info.plist. See [`FrameworkLayout`] for
//! the two shapes a bundle can take.

mod assemble;
pub mod layout;
pub mod metadata;
pub mod plist;

pub use assemble::{
    assemble_all, assemble_bundle, AssemblyFailure, AssemblyOptions, AssemblyOutcome,
    AssemblyStep, FrameworkBundle, HeaderSet,
};
pub use layout::FrameworkLayout;
pub use metadata::BundleMetadata;

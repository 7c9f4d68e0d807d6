//! Runtime resolution of the native library backing the FFI layer.
//!
//! The host platform selects one [`LoadStrategy`] from a [`StrategyTable`]:
//! a library found through the system search path, a library bundled with
//! the application, or the symbols already linked into the running process
//! (Apple platforms, where the framework is embedded at link time). A
//! [`Resolver`] performs that open at most once and hands every caller the
//! same [`LibraryHandle`]; symbol lookups always go through that handle.

pub mod error;
pub mod host;
pub mod loader;
pub mod resolver;
pub mod strategy;

pub use error::{ResolutionError, Result};
pub use host::HostPlatform;
pub use loader::{DynamicLoader, LibraryHandle, Loader, SymbolTable};
pub use resolver::{Resolver, ResolverRegistry};
pub use strategy::{LoadStrategy, StrategyTable};

//! Opening libraries and looking up symbols.

use std::ffi::CString;
use std::sync::Arc;

use libloading::Library;

use crate::error::{ResolutionError, Result};
use crate::strategy::LoadStrategy;

/// An opened library that can answer symbol-by-name lookups.
pub trait SymbolTable: Send + Sync {
    /// Address of the named symbol.
    fn lookup(&self, symbol: &str) -> Result<usize>;

    /// What was opened, for logs and errors.
    fn origin(&self) -> &str;
}

/// Shared handle to the resolved library.
pub type LibraryHandle = Arc<dyn SymbolTable>;

/// Opens the library a strategy names.
pub trait Loader: Send + Sync {
    fn open(&self, strategy: &LoadStrategy) -> Result<LibraryHandle>;
}

/// Loader backed by the platform dynamic linker.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicLoader;

struct LoadedLibrary {
    library: Library,
    origin: String,
}

impl SymbolTable for LoadedLibrary {
    fn lookup(&self, symbol: &str) -> Result<usize> {
        let c_name = CString::new(symbol).map_err(|_| ResolutionError::SymbolNotFound {
            symbol: symbol.to_string(),
            reason: "name contains a NUL byte".into(),
        })?;

        // Safety: the symbol is only read as an address, never called here.
        let addr = unsafe {
            self.library
                .get::<*const ()>(c_name.as_bytes_with_nul())
                .map(|s| *s as usize)
        }
        .map_err(|e| ResolutionError::SymbolNotFound {
            symbol: symbol.to_string(),
            reason: format!("{} ({e})", self.origin),
        })?;
        Ok(addr)
    }

    fn origin(&self) -> &str {
        &self.origin
    }
}

fn open_failed(strategy: &LoadStrategy, reason: impl ToString) -> ResolutionError {
    ResolutionError::OpenFailed {
        strategy: strategy.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(unix)]
fn this_process() -> Result<Library> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn this_process() -> Result<Library> {
    libloading::os::windows::Library::this()
        .map(Into::into)
        .map_err(|e| open_failed(&LoadStrategy::Process, e))
}

#[cfg(not(any(unix, windows)))]
fn this_process() -> Result<Library> {
    Err(open_failed(
        &LoadStrategy::Process,
        "no process-wide symbol namespace on this platform",
    ))
}

impl Loader for DynamicLoader {
    fn open(&self, strategy: &LoadStrategy) -> Result<LibraryHandle> {
        let library = match strategy {
            LoadStrategy::SystemLibrary { name: target }
            | LoadStrategy::BundledLibrary { file_name: target } => {
                // Safety: running the library's initializers is the point of loading it.
                unsafe { Library::new(target) }.map_err(|e| open_failed(strategy, e))?
            }
            LoadStrategy::Process => this_process()?,
        };
        Ok(Arc::new(LoadedLibrary {
            library,
            origin: strategy.to_string(),
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn process_namespace_resolves_libc() {
        let handle = DynamicLoader.open(&LoadStrategy::Process).unwrap();
        assert_ne!(handle.lookup("malloc").unwrap(), 0);
        assert_eq!(handle.origin(), "process symbol namespace");
    }

    #[test]
    fn unknown_symbol() {
        let handle = DynamicLoader.open(&LoadStrategy::Process).unwrap();
        let err = handle.lookup("nativepack_no_such_symbol_41").unwrap_err();
        assert!(matches!(err, ResolutionError::SymbolNotFound { ref symbol, .. } if symbol == "nativepack_no_such_symbol_41"));
        assert!(handle.lookup("bad\0name").is_err());
    }

    #[test]
    fn missing_library_fails_to_open() {
        let err = DynamicLoader
            .open(&LoadStrategy::SystemLibrary {
                name: "libnativepack-definitely-absent.so".into(),
            })
            .err()
            .unwrap();
        match err {
            ResolutionError::OpenFailed { strategy, .. } => {
                assert!(strategy.contains("libnativepack-definitely-absent.so"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

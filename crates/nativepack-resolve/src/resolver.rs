//! Single-initialization library resolver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::{Lazy, OnceCell};
use tracing::{debug, info};

use crate::error::Result;
use crate::host::HostPlatform;
use crate::loader::{DynamicLoader, LibraryHandle, Loader};
use crate::strategy::{LoadStrategy, StrategyTable};

/// Resolves the native library for one host, once.
///
/// Concurrent first callers of [`Resolver::resolve`] converge on a single
/// open and all receive the same handle. A failed open is not remembered;
/// the next call tries again.
pub struct Resolver<L: Loader = DynamicLoader> {
    host: HostPlatform,
    table: StrategyTable,
    loader: L,
    handle: OnceCell<LibraryHandle>,
}

static GLOBAL: Lazy<ResolverRegistry> =
    Lazy::new(|| ResolverRegistry::new(HostPlatform::current(), DynamicLoader));

impl Resolver<DynamicLoader> {
    /// Resolver for the current host using the platform dynamic linker.
    pub fn new(table: StrategyTable) -> Self {
        Self::with_loader(HostPlatform::current(), table, DynamicLoader)
    }

    /// The process-wide resolver for `library`, using the standard strategy
    /// table. Every caller in the process shares it, so the library is opened
    /// at most once per process.
    pub fn global(library: &str) -> Arc<Resolver> {
        GLOBAL.resolver(library)
    }
}

/// One shared [`Resolver`] per library name.
pub struct ResolverRegistry<L: Loader + Clone = DynamicLoader> {
    host: HostPlatform,
    loader: L,
    resolvers: Mutex<HashMap<String, Arc<Resolver<L>>>>,
}

impl<L: Loader + Clone> ResolverRegistry<L> {
    pub fn new(host: HostPlatform, loader: L) -> Self {
        Self {
            host,
            loader,
            resolvers: Mutex::new(HashMap::new()),
        }
    }

    /// The resolver for `library`, created on first request.
    pub fn resolver(&self, library: &str) -> Arc<Resolver<L>> {
        let mut resolvers = self.resolvers.lock().unwrap_or_else(PoisonError::into_inner);
        resolvers
            .entry(library.to_string())
            .or_insert_with(|| {
                Arc::new(Resolver::with_loader(
                    self.host,
                    StrategyTable::for_library(library),
                    self.loader.clone(),
                ))
            })
            .clone()
    }
}

impl<L: Loader> Resolver<L> {
    pub fn with_loader(host: HostPlatform, table: StrategyTable, loader: L) -> Self {
        Self {
            host,
            table,
            loader,
            handle: OnceCell::new(),
        }
    }

    pub fn host(&self) -> HostPlatform {
        self.host
    }

    /// Strategy that applies to this resolver's host.
    pub fn strategy(&self) -> Result<&LoadStrategy> {
        self.table.strategy_for(self.host)
    }

    /// The shared library handle, opening it on first use.
    pub fn resolve(&self) -> Result<LibraryHandle> {
        self.handle
            .get_or_try_init(|| {
                let strategy = self.strategy()?;
                debug!(host = %self.host, %strategy, "selected load strategy");
                let handle = self.loader.open(strategy)?;
                info!(host = %self.host, origin = handle.origin(), "native library resolved");
                Ok(handle)
            })
            .cloned()
    }

    /// Whether a handle has been opened already.
    pub fn is_resolved(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Resolve and check that every routine in `symbols` is present.
    /// Fails on the first missing one.
    pub fn require_symbols<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a str>,
    ) -> Result<LibraryHandle> {
        let handle = self.resolve()?;
        for symbol in symbols {
            handle.lookup(symbol)?;
        }
        Ok(handle)
    }

    /// Resolve and look up one symbol.
    pub fn lookup(&self, symbol: &str) -> Result<usize> {
        self.resolve()?.lookup(symbol)
    }
}

impl<L: Loader> std::fmt::Debug for Resolver<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("host", &self.host)
            .field("table", &self.table)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

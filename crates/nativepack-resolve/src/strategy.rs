//! Host-to-strategy mapping.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ResolutionError, Result};
use crate::host::HostPlatform;

/// How the native library is made available on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Opened by name through the dynamic linker's search path.
    SystemLibrary { name: String },
    /// Shipped inside the application and opened by file name.
    BundledLibrary { file_name: String },
    /// Already linked into the process; symbols come from the global namespace.
    Process,
}

impl LoadStrategy {
    /// What the loader is asked to open.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::SystemLibrary { name } => Some(name),
            Self::BundledLibrary { file_name } => Some(file_name),
            Self::Process => None,
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemLibrary { name } => write!(f, "system library {name}"),
            Self::BundledLibrary { file_name } => write!(f, "bundled library {file_name}"),
            Self::Process => f.write_str("process symbol namespace"),
        }
    }
}

/// Which strategy applies on which host.
#[derive(Debug, Clone, Default)]
pub struct StrategyTable {
    entries: BTreeMap<HostPlatform, LoadStrategy>,
}

impl StrategyTable {
    /// A table with no entries; every host is unsupported.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard table for library `name` (e.g. `h3`):
    /// linux opens `lib<name>.so` from the system search path, android opens
    /// the bundled `lib<name>.so`, and Apple platforms use the process
    /// namespace the embedded framework was linked into.
    pub fn for_library(name: &str) -> Self {
        Self::empty()
            .with(
                HostPlatform::Linux,
                LoadStrategy::SystemLibrary {
                    name: format!("lib{name}.so"),
                },
            )
            .with(
                HostPlatform::Android,
                LoadStrategy::BundledLibrary {
                    file_name: format!("lib{name}.so"),
                },
            )
            .with(HostPlatform::Ios, LoadStrategy::Process)
            .with(HostPlatform::Macos, LoadStrategy::Process)
    }

    /// Set (or replace) the strategy for `host`.
    pub fn with(mut self, host: HostPlatform, strategy: LoadStrategy) -> Self {
        self.entries.insert(host, strategy);
        self
    }

    /// Drop the entry for `host`.
    pub fn without(mut self, host: HostPlatform) -> Self {
        self.entries.remove(&host);
        self
    }

    pub fn strategy_for(&self, host: HostPlatform) -> Result<&LoadStrategy> {
        self.entries
            .get(&host)
            .ok_or(ResolutionError::UnsupportedPlatform { host })
    }

    pub fn entries(&self) -> impl Iterator<Item = (HostPlatform, &LoadStrategy)> {
        self.entries.iter().map(|(h, s)| (*h, s))
    }
}

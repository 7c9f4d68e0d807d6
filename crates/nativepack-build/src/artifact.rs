//! Build artifacts and the symbol-export records derived from them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use nativepack_targets::{Arch, PlatformTarget};
use nativepack_toolchain::Toolchain;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A compiled binary for one target.
///
/// The compiler produces one artifact per (target, arch) slice; the merger
/// folds them into one artifact per target covering every configured arch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub target: PlatformTarget,
    pub path: PathBuf,
    pub archs: BTreeSet<Arch>,
    pub install_name: Option<String>,
}

impl BuildArtifact {
    /// Whether the artifact covers exactly the target's architectures.
    pub fn covers_target(&self) -> bool {
        &self.archs == self.target.archs()
    }

    /// File name of the binary on disk.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Exported names of a binary, per architecture slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolExportRecord {
    pub target: String,
    pub per_arch: BTreeMap<Arch, BTreeSet<String>>,
}

impl SymbolExportRecord {
    /// Read the dynamic symbol table of every slice in `archs`.
    pub fn collect(
        toolchain: &dyn Toolchain,
        target: &PlatformTarget,
        binary: &Path,
        archs: &BTreeSet<Arch>,
    ) -> Result<Self> {
        let mut per_arch = BTreeMap::new();
        for arch in archs {
            per_arch.insert(*arch, toolchain.exported_symbols(binary, *arch)?);
        }
        Ok(Self {
            target: target.identifier(),
            per_arch,
        })
    }

    /// Names exported by every slice.
    pub fn common(&self) -> BTreeSet<String> {
        let mut slices = self.per_arch.values();
        let Some(first) = slices.next() else {
            return BTreeSet::new();
        };
        slices.fold(first.clone(), |acc, s| acc.intersection(s).cloned().collect())
    }

    /// Required names missing from at least one slice, with the slices lacking them.
    pub fn missing<'a>(
        &self,
        required: impl IntoIterator<Item = &'a str>,
    ) -> Vec<(String, Vec<Arch>)> {
        let mut missing = Vec::new();
        for name in required {
            let lacking: Vec<Arch> = self
                .per_arch
                .iter()
                .filter(|(_, syms)| !syms.contains(name))
                .map(|(arch, _)| *arch)
                .collect();
            if !lacking.is_empty() || self.per_arch.is_empty() {
                missing.push((name.to_string(), lacking));
            }
        }
        missing
    }

    /// Total count of distinct exported names.
    pub fn len(&self) -> usize {
        self.per_arch
            .values()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_arch.values().all(BTreeSet::is_empty)
    }
}

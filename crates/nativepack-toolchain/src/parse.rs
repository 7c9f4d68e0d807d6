//! Parsers for host tool output.
//!
//! Kept free of process handling so the formats can be tested on any host.

use std::collections::BTreeSet;

use nativepack_targets::Arch;

use crate::error::{Result, ToolchainError};
use crate::toolchain::{BinaryKind, SignatureRecord};

/// Parse `lipo -archs` output (`x86_64 arm64`).
pub fn parse_lipo_archs(stdout: &str) -> Result<BTreeSet<Arch>> {
    let mut archs = BTreeSet::new();
    for word in stdout.split_whitespace() {
        let arch = Arch::parse(word).map_err(|e| ToolchainError::UnexpectedOutput {
            tool: "lipo".into(),
            detail: e.to_string(),
        })?;
        archs.insert(arch);
    }
    if archs.is_empty() {
        return Err(ToolchainError::UnexpectedOutput {
            tool: "lipo".into(),
            detail: "no architectures reported".into(),
        });
    }
    Ok(archs)
}

/// Parse `nm -gUj` output into C-level names (Mach-O leading `_` removed).
pub fn parse_nm_symbols(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.ends_with(':'))
        .map(|l| l.strip_prefix('_').unwrap_or(l).to_string())
        .collect()
}

/// Parse `otool -D` output. The first non-header line is the install name;
/// static archives have none.
pub fn parse_otool_install_name(stdout: &str) -> Option<String> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    if lines.clone().next()?.starts_with("Archive :") {
        return None;
    }
    lines.find(|l| !l.ends_with(':')).map(str::to_string)
}

/// Parse `otool -hv` output into the kind of binary it describes.
pub fn parse_otool_filetype(stdout: &str) -> BinaryKind {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let Some(first) = lines.clone().next() else {
        return BinaryKind::Unknown;
    };
    if first.starts_with("Archive :") {
        return BinaryKind::StaticArchive;
    }

    while let Some(line) = lines.next() {
        let header: Vec<&str> = line.split_whitespace().collect();
        let Some(col) = header.iter().position(|h| *h == "filetype") else {
            continue;
        };
        let Some(row) = lines.next() else {
            break;
        };
        return match row.split_whitespace().nth(col) {
            Some("DYLIB") => BinaryKind::DynamicLibrary,
            Some("OBJECT") => BinaryKind::Object,
            Some("EXECUTE") => BinaryKind::Executable,
            _ => BinaryKind::Unknown,
        };
    }
    BinaryKind::Unknown
}

/// Parse `codesign -dvv` output (printed on stderr).
pub fn parse_codesign_details(text: &str) -> SignatureRecord {
    if text.contains("not signed at all") {
        return SignatureRecord::unsigned();
    }

    let mut record = SignatureRecord::unsigned();
    for line in text.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("Authority=") {
            record.signed = true;
            if record.authority.is_none() {
                record.authority = Some(value.to_string());
            }
        } else if let Some(value) = line.strip_prefix("Signature=") {
            record.signed = true;
            if value == "adhoc" && record.authority.is_none() {
                record.authority = Some("adhoc".into());
            }
        } else if let Some(value) = line.strip_prefix("Identifier=") {
            record.identifier = Some(value.to_string());
        } else if line.starts_with("CodeDirectory") {
            record.signed = true;
        }
    }
    record
}

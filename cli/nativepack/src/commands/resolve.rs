//! `nativepack resolve`: runtime resolver smoke test on this host.

use anyhow::{bail, Context, Result};
use nativepack_resolve::{Loader, Resolver};

use crate::manifest::ProjectManifest;

/// Resolve the native library the way the runtime would and look up
/// `symbols` (default: the manifest's verified symbols).
pub fn run(
    manifest: Option<&ProjectManifest>,
    library: Option<&str>,
    symbols: &[String],
) -> Result<()> {
    let name = match (library, manifest) {
        (Some(name), _) => name.to_string(),
        (None, Some(m)) => m.library.name.clone(),
        (None, None) => bail!("no library given (pass --library or run inside a project)"),
    };
    let symbols: Vec<String> = if symbols.is_empty() {
        manifest
            .map(|m| {
                m.verify_config()
                    .all_symbols()
                    .into_iter()
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    } else {
        symbols.to_vec()
    };

    let resolver = Resolver::global(&name);
    resolve_with(&*resolver, &symbols)
}

pub(crate) fn resolve_with<L: Loader>(resolver: &Resolver<L>, symbols: &[String]) -> Result<()> {
    println!("Host:     {}", resolver.host());
    let strategy = resolver.strategy()?;
    println!("Strategy: {strategy}");

    let handle = resolver
        .resolve()
        .with_context(|| format!("resolving via {strategy}"))?;
    println!("Opened:   {}", handle.origin());

    if symbols.is_empty() {
        return Ok(());
    }
    println!();
    for symbol in symbols {
        let address = handle.lookup(symbol)?;
        println!("  {symbol:<28} 0x{address:x}");
    }
    resolver.require_symbols(symbols.iter().map(String::as_str))?;
    println!();
    println!("All {} symbol(s) resolved.", symbols.len());
    Ok(())
}

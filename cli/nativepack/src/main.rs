//! nativepack CLI: build, package, verify and resolve multi-platform native
//! libraries.

mod commands;
mod manifest;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use manifest::ProjectManifest;

#[derive(Parser)]
#[command(
    name = "nativepack",
    version,
    about = "Package native libraries as verified multi-platform frameworks"
)]
struct Cli {
    /// Path to nativepack.toml (default: search upward from the working directory)
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new packaging project
    Init {
        /// Project (and library) name
        name: String,
    },
    /// Compile, merge, bundle, package and verify every target
    Build {
        /// Restrict the run to these target identifiers (repeatable)
        #[arg(long = "target")]
        targets: Vec<String>,
        /// Output directory (default: dist)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Never clone pinned sources; fail if they are absent
        #[arg(long)]
        skip_fetch: bool,
    },
    /// Re-run the integrity checks on a built package
    Verify {
        /// Package directory (default: the project's build output)
        #[arg(long)]
        package: Option<PathBuf>,
    },
    /// Check the toolchain and project configuration
    Doctor,
    /// List or describe platform targets
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },
    /// Resolve the native library on this host and look up symbols
    Resolve {
        /// Library name (default: [library] name from the manifest)
        #[arg(long)]
        library: Option<String>,
        /// Symbol to look up (repeatable; default: the verified symbols)
        #[arg(long = "symbol")]
        symbols: Vec<String>,
    },
    /// Remove build scratch space and output
    Clean {
        /// Output directory to remove (default: dist)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TargetAction {
    List,
    Describe {
        /// Target identifier, e.g. ios-arm64_x86_64-simulator
        id: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let explicit = cli.manifest.as_deref();

    match cli.command {
        Commands::Init { name } => commands::init::run(&name),

        Commands::Build {
            targets,
            out,
            skip_fetch,
        } => {
            let (manifest, project_dir) = load_manifest_required(&cwd, explicit)?;
            commands::build::run(&project_dir, &manifest, &targets, out.as_deref(), skip_fetch)
        }

        Commands::Verify { package } => {
            let (manifest, project_dir) = load_manifest_required(&cwd, explicit)?;
            commands::verify::run(&project_dir, &manifest, package.as_deref())
        }

        Commands::Doctor => {
            let project_dir = match explicit {
                Some(path) => manifest_dir(path),
                None => cwd,
            };
            commands::doctor::run(&project_dir)
        }

        Commands::Target { action } => {
            let (manifest, _) = load_manifest_optional(&cwd, explicit)?;
            match action {
                TargetAction::List => commands::target::list(manifest.as_ref()),
                TargetAction::Describe { id } => commands::target::describe(&id, manifest.as_ref()),
            }
        }

        Commands::Resolve { library, symbols } => {
            let (manifest, _) = load_manifest_optional(&cwd, explicit)?;
            commands::resolve::run(manifest.as_ref(), library.as_deref(), &symbols)
        }

        Commands::Clean { out } => {
            let (_, project_dir) = load_manifest_optional(&cwd, explicit)?;
            let project_dir = project_dir.unwrap_or(cwd);
            commands::clean::run(&project_dir, out.as_deref())
        }
    }
}

fn manifest_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load manifest, returning error if not found.
fn load_manifest_required(
    cwd: &Path,
    explicit: Option<&Path>,
) -> anyhow::Result<(ProjectManifest, PathBuf)> {
    match load_manifest_optional(cwd, explicit)? {
        (Some(manifest), Some(dir)) => Ok((manifest, dir)),
        _ => bail!("no nativepack.toml found (run `nativepack init` first)"),
    }
}

/// Load the manifest named by `--manifest`, or search upward from the working
/// directory. Returns (None, None) if no manifest is found.
fn load_manifest_optional(
    cwd: &Path,
    explicit: Option<&Path>,
) -> anyhow::Result<(Option<ProjectManifest>, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let manifest = ProjectManifest::load(path)
            .with_context(|| format!("loading manifest {}", path.display()))?;
        return Ok((Some(manifest), Some(manifest_dir(path))));
    }
    match ProjectManifest::find_and_load(cwd)? {
        Some((manifest, dir)) => Ok((Some(manifest), Some(dir))),
        None => Ok((None, None)),
    }
}

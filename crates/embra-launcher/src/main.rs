//! Desktop launcher for Embra applications.
//!
//! Runs the same bootstrap sequence the mobile shell runs, with storage
//! locations derived from the user's data directories instead of the
//! device's, then hands control to the loaded main module's entry
//! function and exits with its status.
//!
//! ```bash
//! embra-launcher --manifest ./app.manifest
//! RUST_LOG=debug embra-launcher --manifest ./app.manifest --config ./bootstrap.ini
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use embra_bootstrap::{run, BootstrapRequest, NativeLinker, StorageLocations};

#[derive(Parser)]
#[command(name = "embra-launcher")]
#[command(about = "Launch an Embra application from its manifest", version)]
struct Args {
    /// Path to the application manifest
    #[arg(long)]
    manifest: PathBuf,

    /// Bootstrap configuration file (defaults to engine/bootstrap.ini
    /// under the per-user data directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Expansion-asset directory, for manifests referencing
    /// ${expansion_dir}
    #[arg(long)]
    expansion_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();

    info!("embra-launcher v{}", env!("CARGO_PKG_VERSION"));

    let manifest = absolutize(&args.manifest)?;
    let mut locations = StorageLocations::for_desktop("embra");
    locations.expansion_dir = args.expansion_dir;

    let mut request = BootstrapRequest::new(locations, Some(manifest.display().to_string()));
    if let Some(config) = args.config {
        request = request.with_config_path(absolutize(&config)?);
    }

    let mut linker = NativeLinker::new();
    let report = run(&request, &mut linker);

    if !report.succeeded() {
        let reason = report
            .failure
            .map(|reason| reason.as_str())
            .unwrap_or("unknown");
        bail!(
            "bootstrap failed ({reason}): {}",
            report.detail.unwrap_or_default()
        );
    }
    if report.degraded {
        warn!("no bootstrap configuration found, running the bundled main module");
    }

    let status = linker
        .run_main_entry(std::ptr::null_mut())
        .context("engine main entry unavailable")?;
    info!(status, "engine main entry returned");
    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}

/// Resolve a command-line path against the current directory, matching
/// what the engine will later read back from the environment.
fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("cannot resolve current directory")?
        .join(path))
}

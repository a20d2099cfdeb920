//! CLI entry point for the share-mirror tool.

use std::io::{self, IsTerminal};
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use share_mirror_core::mirror::destination_path;
use share_mirror_core::{BrowserSession, Mirror, Page};
use tracing::{debug, info};

mod cli;
mod config;
mod progress;

use cli::Args;
use config::{Settings, load_config};
use progress::spawn_progress_ui;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let loaded = load_config(args.config.as_deref())?;
    if let Some(path) = loaded.path.as_deref().filter(|_| loaded.config.is_some()) {
        debug!(path = %path.display(), "config file loaded");
    }
    let settings = Settings::resolve(&args, loaded.config.as_ref());

    info!(url = %args.url, "share-mirror starting");

    let session = BrowserSession::launch(settings.chromium_options())
        .await
        .context("Failed to launch browser")?;

    let outcome = mirror_share(session.page(), &args, &settings).await;

    // The browser is released whether or not the run succeeded.
    session.close().await;
    outcome
}

async fn mirror_share(page: &dyn Page, args: &Args, settings: &Settings) -> Result<()> {
    let mirror = Mirror::new(page, settings.mirror_options());

    if args.dry_run {
        let files = mirror
            .discover(&args.url)
            .await
            .with_context(|| format!("Failed to list {}", args.url))?;
        for entry in files.iter() {
            println!(
                "{}",
                destination_path(&settings.output_dir, &entry.relative_path).display()
            );
        }
        info!(files = files.len(), "dry run complete, nothing retrieved");
        return Ok(());
    }

    let use_spinner =
        !args.no_progress && !args.quiet && args.verbose == 0 && io::stderr().is_terminal();
    let (spinner, stop) = spawn_progress_ui(use_spinner, mirror.stats());

    let result = mirror.run(&args.url).await;

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }

    let summary = result.with_context(|| format!("Failed to mirror {}", args.url))?;
    info!(
        folders = summary.folders_listed,
        files = summary.files_written,
        bytes = summary.bytes_written,
        retried = summary.retries,
        output_dir = %settings.output_dir.display(),
        "Mirror complete"
    );
    Ok(())
}

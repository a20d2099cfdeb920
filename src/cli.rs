//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Mirror a browser-rendered file share to a local directory.
///
/// Share-mirror walks the folder tree below the given URL in a headless
/// browser, then captures every file's payload from the page's own network
/// traffic and writes it under the output directory.
#[derive(Parser, Debug)]
#[command(name = "share-mirror")]
#[command(author, version, about)]
pub struct Args {
    /// Root folder URL of the share
    #[arg(value_parser = parse_share_url)]
    pub url: Url,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory receiving the mirrored tree [default: download]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Attempts per folder listing or file capture (1-100) [default: 10]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_attempts: Option<u32>,

    /// Seconds to wait for a file's payload (1-600) [default: 20]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=600))]
    pub capture_timeout: Option<u64>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Chrome or Chromium binary to launch
    #[arg(long, value_name = "PATH")]
    pub chrome: Option<PathBuf>,

    /// Config file to load instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// List the tree and print destination paths without retrieving files
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

fn parse_share_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL '{raw}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{other}', expected http or https")),
    }
}

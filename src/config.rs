//! Configuration file loading and CLI merge.
//!
//! Precedence: CLI flag > config file > built-in default.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use share_mirror_core::mirror::{
    DEFAULT_CAPTURE_TIMEOUT, DEFAULT_DOWNLOAD_SUFFIX, DEFAULT_ITEM_SELECTOR, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_OUTPUT_DIR, MirrorOptions, RetryPolicy,
};
use share_mirror_core::page::ChromiumOptions;
use share_mirror_core::page::chromium::{DEFAULT_IDLE_TIME, DEFAULT_IDLE_TIMEOUT};
use tracing::debug;

use crate::cli::Args;

/// TOML-backed file configuration. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    /// Root directory receiving the mirrored tree.
    pub output_dir: Option<PathBuf>,
    /// Attempts per listing or capture (1..=100).
    pub max_attempts: Option<u32>,
    /// Capture window per file in seconds (1..=600).
    pub capture_timeout_secs: Option<u64>,
    /// Quiet period counting as network idle, in milliseconds (0..=60000).
    pub idle_time_ms: Option<u64>,
    /// Upper bound on waiting for network idle, in seconds (1..=600).
    pub idle_timeout_secs: Option<u64>,
    /// CSS selector of item links on folder pages.
    pub item_selector: Option<String>,
    /// URL suffix of the internal payload request.
    pub download_suffix: Option<String>,
    /// Run the browser without a window.
    pub headless: Option<bool>,
    /// Chrome binary to launch.
    pub chrome_executable: Option<PathBuf>,
}

impl FileConfig {
    /// Validates values against the ranges the CLI accepts.
    pub(crate) fn validate(&self) -> Result<()> {
        check_range("max_attempts", self.max_attempts.map(u64::from), 1, 100)?;
        check_range("capture_timeout_secs", self.capture_timeout_secs, 1, 600)?;
        check_range("idle_time_ms", self.idle_time_ms, 0, 60_000)?;
        check_range("idle_timeout_secs", self.idle_timeout_secs, 1, 600)?;
        check_not_blank("item_selector", self.item_selector.as_deref())?;
        check_not_blank("download_suffix", self.download_suffix.as_deref())?;
        Ok(())
    }
}

fn check_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

fn check_not_blank(field: &str, value: Option<&str>) -> Result<()> {
    if value.is_some_and(|v| v.trim().is_empty()) {
        bail!("Invalid config value for `{field}`: must not be empty");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub(crate) struct LoadedConfig {
    /// Path that was consulted, if any.
    pub path: Option<PathBuf>,
    /// Parsed config when a file was found.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/share-mirror/config.toml`
/// 2. `$HOME/.config/share-mirror/config.toml`
#[must_use]
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    default_config_path_from(env_var_non_empty_os("XDG_CONFIG_HOME"), env_var_non_empty_os("HOME"))
}

fn default_config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg_config_home) = xdg_config_home {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("share-mirror")
                .join("config.toml"),
        );
    }

    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("share-mirror")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path) if path.exists() => Some(load_file_config(path)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Effective settings after merging CLI, config file and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub output_dir: PathBuf,
    pub max_attempts: u32,
    pub capture_timeout: Duration,
    pub idle_time: Duration,
    pub idle_timeout: Duration,
    pub item_selector: String,
    pub download_suffix: String,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
}

impl Settings {
    /// Merges CLI flags over the file config over defaults.
    pub(crate) fn resolve(args: &Args, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();
        let settings = Self {
            output_dir: args
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            max_attempts: args
                .max_attempts
                .or(file.max_attempts)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            capture_timeout: args
                .capture_timeout
                .or(file.capture_timeout_secs)
                .map_or(DEFAULT_CAPTURE_TIMEOUT, Duration::from_secs),
            idle_time: file
                .idle_time_ms
                .map_or(DEFAULT_IDLE_TIME, Duration::from_millis),
            idle_timeout: file
                .idle_timeout_secs
                .map_or(DEFAULT_IDLE_TIMEOUT, Duration::from_secs),
            item_selector: file
                .item_selector
                .unwrap_or_else(|| DEFAULT_ITEM_SELECTOR.to_string()),
            download_suffix: file
                .download_suffix
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_SUFFIX.to_string()),
            headless: !args.headful && file.headless.unwrap_or(true),
            chrome_executable: args.chrome.clone().or(file.chrome_executable),
        };
        debug!(?settings, "settings resolved");
        settings
    }

    pub(crate) fn mirror_options(&self) -> MirrorOptions {
        MirrorOptions {
            output_dir: self.output_dir.clone(),
            retry_policy: RetryPolicy::with_max_attempts(self.max_attempts),
            item_selector: self.item_selector.clone(),
            download_suffix: self.download_suffix.clone(),
            capture_timeout: self.capture_timeout,
        }
    }

    pub(crate) fn chromium_options(&self) -> ChromiumOptions {
        ChromiumOptions {
            headless: self.headless,
            chrome_executable: self.chrome_executable.clone(),
            idle_time: self.idle_time,
            idle_timeout: self.idle_timeout,
            ..ChromiumOptions::default()
        }
    }
}

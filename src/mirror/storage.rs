//! Local persistence of mirrored files.

use std::ffi::OsString;
use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::MirrorError;

/// Default output directory for mirrored files.
pub const DEFAULT_OUTPUT_DIR: &str = "download";

/// Destination of an entry: `output_dir` + separator + `relative_path`.
///
/// The relative path is appended as text rather than joined, so a name can
/// never replace the output directory.
#[must_use]
pub fn destination_path(output_dir: &Path, relative_path: &str) -> PathBuf {
    let mut path = OsString::from(output_dir.as_os_str());
    path.push(MAIN_SEPARATOR_STR);
    path.push(relative_path);
    PathBuf::from(path)
}

/// Writes `bytes` to `path`, creating missing parent directories and
/// overwriting any existing file.
///
/// # Errors
///
/// Returns [`MirrorError::Io`] if a directory or the file cannot be written.
#[instrument(level = "debug", skip(bytes), fields(path = %path.display(), len = bytes.len()))]
pub async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), MirrorError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MirrorError::io(parent, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| MirrorError::io(path, e))?;
    debug!("file written");
    Ok(())
}

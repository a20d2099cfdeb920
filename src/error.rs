//! Error type shared by every mirror operation.
//!
//! Folder listing and file capture both funnel their failures through
//! [`MirrorError`] so the retry executor can treat them uniformly. The
//! transient/structural split in [`FailureType`] is for diagnostics only:
//! the executor retries every failure the same way, so a structural failure
//! still burns all attempts before it surfaces.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::instrument;

use crate::page::PageError;

/// Errors that can occur while mirroring a remote share.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The browser page failed (navigation, idle wait, script, body fetch).
    #[error(transparent)]
    Page(#[from] PageError),

    /// A URL has neither the file nor the folder shape.
    #[error("unknown item type for {url}")]
    UnknownItemKind {
        /// The unclassifiable absolute URL.
        url: String,
    },

    /// An item link on a folder page has no display text.
    #[error("item link without text on {folder}")]
    MissingLinkText {
        /// The folder page being listed.
        folder: String,
    },

    /// An item link on a folder page has no href.
    #[error("item link '{name}' without href on {folder}")]
    MissingLinkHref {
        /// The folder page being listed.
        folder: String,
        /// Display text of the link.
        name: String,
    },

    /// An href could not be resolved against its folder URL.
    #[error("invalid item URL '{href}' on {folder}: {source}")]
    InvalidUrl {
        /// The folder page being listed.
        folder: String,
        /// The raw href.
        href: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// No download request finished before the capture timeout.
    #[error("timeout capturing payload of {url} after {timeout:?}")]
    CaptureTimeout {
        /// The file page URL.
        url: String,
        /// The capture window.
        timeout: Duration,
    },

    /// The finished-request stream ended before a download request was seen.
    #[error("network event stream closed while capturing {url}")]
    CaptureClosed {
        /// The file page URL.
        url: String,
    },

    /// A matching download request finished without a response.
    #[error("download request {request_url} finished without a response")]
    MissingResponse {
        /// URL of the matched request.
        request_url: String,
    },

    /// Writing a mirrored file failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    /// Creates an unknown item kind error.
    pub fn unknown_item_kind(url: impl Into<String>) -> Self {
        Self::UnknownItemKind { url: url.into() }
    }

    /// Creates a missing link text error.
    pub fn missing_link_text(folder: impl Into<String>) -> Self {
        Self::MissingLinkText {
            folder: folder.into(),
        }
    }

    /// Creates a missing link href error.
    pub fn missing_link_href(folder: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingLinkHref {
            folder: folder.into(),
            name: name.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(
        folder: impl Into<String>,
        href: impl Into<String>,
        source: url::ParseError,
    ) -> Self {
        Self::InvalidUrl {
            folder: folder.into(),
            href: href.into(),
            source,
        }
    }

    /// Creates a capture timeout error.
    pub fn capture_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self::CaptureTimeout {
            url: url.into(),
            timeout,
        }
    }

    /// Creates a capture closed error.
    pub fn capture_closed(url: impl Into<String>) -> Self {
        Self::CaptureClosed { url: url.into() }
    }

    /// Creates a missing response error.
    pub fn missing_response(request_url: impl Into<String>) -> Self {
        Self::MissingResponse {
            request_url: request_url.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Coarse classification of a failure, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected to clear up on a blind retry (network hiccup, timeout).
    Transient,
    /// The remote page or endpoint no longer matches what we expect.
    Structural,
}

impl FailureType {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Structural => "structural",
        }
    }
}

/// Classifies a mirror error as transient or structural.
///
/// | Error | Type |
/// |-------|------|
/// | navigation, idle timeout, capture timeout, closed stream | Transient |
/// | launch, script, subscription, body fetch, closed page | Transient |
/// | unknown item kind, missing text/href, invalid URL | Structural |
/// | missing response | Structural |
/// | IO | Structural |
#[must_use]
#[instrument(level = "trace")]
pub fn classify_failure(error: &MirrorError) -> FailureType {
    match error {
        MirrorError::Page(_)
        | MirrorError::CaptureTimeout { .. }
        | MirrorError::CaptureClosed { .. } => FailureType::Transient,

        MirrorError::UnknownItemKind { .. }
        | MirrorError::MissingLinkText { .. }
        | MirrorError::MissingLinkHref { .. }
        | MirrorError::InvalidUrl { .. }
        | MirrorError::MissingResponse { .. }
        | MirrorError::Io { .. } => FailureType::Structural,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_timeout_display() {
        let error = MirrorError::capture_timeout(
            "https://share.example.com/file/9",
            Duration::from_secs(20),
        );
        let msg = error.to_string();
        assert!(msg.contains("timeout"), "{msg}");
        assert!(msg.contains("https://share.example.com/file/9"), "{msg}");
        assert!(msg.contains("20s"), "{msg}");
    }

    #[test]
    fn test_missing_link_href_display() {
        let msg =
            MirrorError::missing_link_href("https://share.example.com/folder/1", "notes.txt")
                .to_string();
        assert!(msg.contains("notes.txt"), "{msg}");
        assert!(msg.contains("https://share.example.com/folder/1"), "{msg}");
    }

    #[test]
    fn test_page_error_is_transparent() {
        let error = MirrorError::from(PageError::navigation("https://x.test/", "reset"));
        assert_eq!(error.to_string(), "navigation to https://x.test/ failed: reset");
    }

    #[test]
    fn test_classify_failure_transient() {
        let transient = [
            MirrorError::from(PageError::navigation("https://x.test/", "reset")),
            MirrorError::from(PageError::IdleTimeout {
                timeout: Duration::from_secs(30),
            }),
            MirrorError::capture_timeout("https://x.test/file/1", Duration::from_secs(20)),
            MirrorError::capture_closed("https://x.test/file/1"),
        ];
        for error in &transient {
            assert_eq!(classify_failure(error), FailureType::Transient, "{error}");
        }
    }

    #[test]
    fn test_classify_failure_structural() {
        let structural = [
            MirrorError::unknown_item_kind("https://x.test/about"),
            MirrorError::missing_link_text("https://x.test/folder/1"),
            MirrorError::missing_link_href("https://x.test/folder/1", "a"),
            MirrorError::missing_response("https://x.test/api/download"),
            MirrorError::io(
                "download/a",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ),
        ];
        for error in &structural {
            assert_eq!(classify_failure(error), FailureType::Structural, "{error}");
        }
    }

    #[test]
    fn test_failure_type_labels() {
        assert_eq!(FailureType::Transient.as_str(), "transient");
        assert_eq!(FailureType::Structural.as_str(), "structural");
    }
}

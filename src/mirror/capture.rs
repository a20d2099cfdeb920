//! Capturing a file's payload from the page's network traffic.
//!
//! A file page never links its payload directly. Visiting it makes the page
//! issue an internal request to the download endpoint; the payload is the
//! buffered body of that request. [`FileRetriever::retrieve`] therefore:
//!
//! 1. subscribes to finished requests (released on every exit path),
//! 2. navigates to the file page while watching for the first finished
//!    request whose URL ends with the download suffix,
//! 3. bounds the whole race by the capture timeout.
//!
//! When the payload arrives first, the pending navigation future is dropped
//! and its outcome is never observed; the next navigation on the shared page
//! supersedes it. A navigation that fails before any payload arrives fails
//! the attempt.

use std::pin::pin;
use std::time::Duration;

use tracing::{debug, info, instrument, trace};
use url::Url;

use crate::error::MirrorError;
use crate::page::{Page, SubscriptionGuard};

/// Default capture window per file.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(20);

/// URL suffix of the internal payload request.
pub const DEFAULT_DOWNLOAD_SUFFIX: &str = "/download";

/// Retrieves file payloads through the shared browser page.
pub struct FileRetriever<'a> {
    page: &'a dyn Page,
    download_suffix: String,
    timeout: Duration,
}

impl<'a> FileRetriever<'a> {
    /// Creates a retriever matching payload requests by `download_suffix`.
    #[must_use]
    pub fn new(page: &'a dyn Page, download_suffix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            page,
            download_suffix: download_suffix.into(),
            timeout,
        }
    }

    /// Navigates to `file_url` and returns the captured payload bytes.
    ///
    /// # Errors
    ///
    /// - [`MirrorError::CaptureTimeout`] if no payload arrived in time
    /// - [`MirrorError::MissingResponse`] if the payload request has no response
    /// - [`MirrorError::CaptureClosed`] if the event stream ended first
    /// - [`MirrorError::Page`] for subscription, navigation, or body failures
    #[instrument(skip(self), fields(url = %file_url))]
    pub async fn retrieve(&self, file_url: &Url) -> Result<Vec<u8>, MirrorError> {
        info!("scraping {file_url}");

        let mut subscription = SubscriptionGuard::subscribe(self.page).await?;

        let race = async {
            let mut capture = pin!(capture_payload(
                self.page,
                &mut subscription,
                &self.download_suffix,
                file_url,
            ));
            let mut navigation = pin!(self.page.goto(file_url));
            let mut navigated = false;
            loop {
                tokio::select! {
                    biased;
                    bytes = &mut capture => return bytes,
                    result = &mut navigation, if !navigated => {
                        result?;
                        navigated = true;
                        trace!("navigation settled, waiting for payload");
                    }
                }
            }
        };

        match tokio::time::timeout(self.timeout, race).await {
            Ok(result) => result,
            Err(_) => Err(MirrorError::capture_timeout(file_url.as_str(), self.timeout)),
        }
    }
}

/// Waits for the first finished request ending in `suffix` and fetches its body.
async fn capture_payload(
    page: &dyn Page,
    subscription: &mut SubscriptionGuard<'_>,
    suffix: &str,
    file_url: &Url,
) -> Result<Vec<u8>, MirrorError> {
    while let Some(request) = subscription.next().await {
        if !request.url.ends_with(suffix) {
            trace!(request = %request.url, "ignoring finished request");
            continue;
        }
        if !request.has_response {
            return Err(MirrorError::missing_response(request.url));
        }
        let bytes = page.response_body(&request).await?;
        debug!(request = %request.url, len = bytes.len(), "payload captured");
        return Ok(bytes);
    }
    Err(MirrorError::capture_closed(file_url.as_str()))
}

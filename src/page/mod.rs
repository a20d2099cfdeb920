//! Browser page capability used by the mirror.
//!
//! The remote share only renders inside a browser, so everything the mirror
//! needs from it goes through the [`Page`] trait:
//!
//! - navigate and wait for network idle
//! - read the item links of the rendered listing
//! - subscribe to (and unsubscribe from) finished network requests
//! - fetch the buffered body of a finished request
//!
//! [`ChromiumPage`] drives a real headless Chrome; tests drive scripted fakes.
//! A single page instance is shared by every operation of a run.

pub mod chromium;
mod error;

pub use chromium::{BrowserSession, ChromiumOptions, ChromiumPage};
pub use error::PageError;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;
use url::Url;

use crate::remote::RawLink;

/// Identifies one finished-request subscription on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// A network request that completed on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedRequest {
    /// Driver-specific request identifier, used to fetch the body.
    pub request_id: String,
    /// URL of the request.
    pub url: String,
    /// Whether a response was received for the request.
    pub has_response: bool,
}

/// A live stream of finished requests.
///
/// Must be released with [`Page::unsubscribe`]; [`SubscriptionGuard`] does
/// that on drop.
#[derive(Debug)]
pub struct Subscription {
    /// Identifier to pass to [`Page::unsubscribe`].
    pub id: SubscriptionId,
    /// Finished requests, in completion order.
    pub events: mpsc::UnboundedReceiver<FinishedRequest>,
}

/// Capabilities the mirror needs from a browser page.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigates the page to `url`.
    async fn goto(&self, url: &Url) -> Result<(), PageError>;

    /// Waits until the page's network activity has been quiet for a while.
    async fn wait_for_network_idle(&self) -> Result<(), PageError>;

    /// Returns text and raw `href` of every element matching `selector`, in
    /// document order.
    async fn item_links(&self, selector: &str) -> Result<Vec<RawLink>, PageError>;

    /// Starts delivering finished requests of this page.
    async fn subscribe_finished_requests(&self) -> Result<Subscription, PageError>;

    /// Stops a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Fetches the buffered response body of a finished request.
    async fn response_body(&self, request: &FinishedRequest) -> Result<Vec<u8>, PageError>;
}

/// Owns a [`Subscription`] and unsubscribes exactly once when dropped.
pub struct SubscriptionGuard<'a> {
    page: &'a dyn Page,
    subscription: Subscription,
}

impl<'a> SubscriptionGuard<'a> {
    /// Subscribes to finished requests of `page`.
    ///
    /// # Errors
    ///
    /// Propagates the page's subscription error; nothing needs releasing then.
    pub async fn subscribe(page: &'a dyn Page) -> Result<Self, PageError> {
        let subscription = page.subscribe_finished_requests().await?;
        trace!(id = subscription.id.0, "subscribed to finished requests");
        Ok(Self { page, subscription })
    }

    /// Receives the next finished request, or `None` once the page closed the stream.
    pub async fn next(&mut self) -> Option<FinishedRequest> {
        self.subscription.events.recv().await
    }
}

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        trace!(id = self.subscription.id.0, "unsubscribing from finished requests");
        self.page.unsubscribe(self.subscription.id);
    }
}

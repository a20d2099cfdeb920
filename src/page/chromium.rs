//! [`Page`] backed by a headless Chrome over the DevTools protocol.
//!
//! A single network monitor task per page tracks every request from
//! `requestWillBeSent` to `loadingFinished`/`loadingFailed`. It feeds two
//! consumers:
//!
//! - the idle heuristic (in-flight count plus an activity counter on a watch
//!   channel), and
//! - finished-request subscribers, each registered as an unbounded sender.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use chromiumoxide::Page as CdpPage;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, RequestId,
};
use futures_util::{FutureExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use super::{FinishedRequest, Page, PageError, Subscription, SubscriptionId};
use crate::remote::RawLink;

/// Per-resource network buffer, large enough to keep big payload bodies
/// retrievable after the request finished.
pub const DEFAULT_MAX_RESOURCE_BUFFER_SIZE: i64 = 1024 * 1204 * 100;

/// Total network buffer across all resources of the page.
pub const DEFAULT_MAX_TOTAL_BUFFER_SIZE: i64 = 1024 * 1204 * 200;

/// Quiet period after which the network counts as idle.
pub const DEFAULT_IDLE_TIME: Duration = Duration::from_millis(500);

/// Upper bound on waiting for network idle.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser and page tuning.
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Chrome binary to launch instead of the auto-detected one.
    pub chrome_executable: Option<PathBuf>,
    /// Quiet period for [`Page::wait_for_network_idle`].
    pub idle_time: Duration,
    /// Timeout for [`Page::wait_for_network_idle`].
    pub idle_timeout: Duration,
    /// Per-resource network buffer size in bytes.
    pub max_resource_buffer_size: i64,
    /// Total network buffer size in bytes.
    pub max_total_buffer_size: i64,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            idle_time: DEFAULT_IDLE_TIME,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_resource_buffer_size: DEFAULT_MAX_RESOURCE_BUFFER_SIZE,
            max_total_buffer_size: DEFAULT_MAX_TOTAL_BUFFER_SIZE,
        }
    }
}

/// A launched browser with the one page the mirror drives.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: ChromiumPage,
}

impl BrowserSession {
    /// Launches Chrome and opens a blank page.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::Launch`] if the browser cannot be started or the
    /// page cannot be prepared.
    #[instrument(skip(options), fields(headless = options.headless))]
    pub async fn launch(options: ChromiumOptions) -> Result<Self, PageError> {
        let mut builder = BrowserConfig::builder();
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(PageError::launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PageError::launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(error) = event {
                    debug!(%error, "browser handler error");
                }
            }
            trace!("browser handler finished");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| PageError::launch(e.to_string()))?;
        let page = ChromiumPage::new(page, options).await?;

        info!("browser launched");
        Ok(Self {
            browser,
            handler,
            page,
        })
    }

    /// Returns the shared page.
    #[must_use]
    pub fn page(&self) -> &ChromiumPage {
        &self.page
    }

    /// Closes the browser and stops the event handler.
    pub async fn close(mut self) {
        drop(self.page);
        if let Err(error) = self.browser.close().await {
            warn!(%error, "failed to close browser cleanly");
        }
        if let Err(error) = self.browser.wait().await {
            warn!(%error, "failed to wait for browser exit");
        }
        self.handler.abort();
        info!("browser closed");
    }
}

/// Network activity snapshot published by the monitor task.
#[derive(Debug, Clone, Copy, Default)]
struct NetworkActivity {
    inflight: usize,
    events: u64,
}

#[derive(Debug)]
struct TrackedRequest {
    url: String,
    has_response: bool,
}

/// Per-request state from `requestWillBeSent` to `loadingFinished`/`loadingFailed`.
///
/// Events of one request must be applied in protocol order. Events for ids
/// that were never sent are ignored.
#[derive(Debug, Default)]
struct RequestTracker {
    requests: HashMap<String, TrackedRequest>,
}

impl RequestTracker {
    fn sent(&mut self, id: &str, url: &str) {
        // Redirects reuse the request id; only the URL moves on.
        self.requests
            .entry(id.to_string())
            .and_modify(|tracked| url.clone_into(&mut tracked.url))
            .or_insert_with(|| TrackedRequest {
                url: url.to_string(),
                has_response: false,
            });
    }

    fn responded(&mut self, id: &str) {
        if let Some(tracked) = self.requests.get_mut(id) {
            tracked.has_response = true;
        }
    }

    fn finished(&mut self, id: &str) -> Option<FinishedRequest> {
        let tracked = self.requests.remove(id)?;
        Some(FinishedRequest {
            request_id: id.to_string(),
            url: tracked.url,
            has_response: tracked.has_response,
        })
    }

    fn failed(&mut self, id: &str) {
        self.requests.remove(id);
    }

    fn inflight(&self) -> usize {
        self.requests.len()
    }
}

type Subscribers = Arc<Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<FinishedRequest>>>>;

/// [`Page`] implementation over a `chromiumoxide` page.
pub struct ChromiumPage {
    page: CdpPage,
    options: ChromiumOptions,
    activity: watch::Receiver<NetworkActivity>,
    subscribers: Subscribers,
    next_subscription: AtomicU64,
    monitor: JoinHandle<()>,
}

impl ChromiumPage {
    /// Wraps a page: enlarges its network buffers and starts the network monitor.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::Launch`] if the network domain cannot be enabled
    /// or event listeners cannot be registered.
    pub async fn new(page: CdpPage, options: ChromiumOptions) -> Result<Self, PageError> {
        let enable = EnableParams::builder()
            .max_resource_buffer_size(options.max_resource_buffer_size)
            .max_total_buffer_size(options.max_total_buffer_size)
            .build();
        page.execute(enable)
            .await
            .map_err(|e| PageError::launch(format!("enable network domain: {e}")))?;

        let listen = |e: chromiumoxide::error::CdpError| {
            PageError::launch(format!("register network listener: {e}"))
        };
        let sent = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(listen)?
            .map(|event| (event.request_id.inner().clone(), event.request.url.clone()));
        let responded = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(listen)?
            .map(|event| event.request_id.inner().clone());
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(listen)?
            .map(|event| event.request_id.inner().clone());
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(listen)?
            .map(|event| event.request_id.inner().clone());

        let (activity_tx, activity) = watch::channel(NetworkActivity::default());
        let subscribers: Subscribers = Arc::default();
        let monitor = tokio::spawn(monitor_network(
            NetworkEvents {
                sent,
                responded,
                finished,
                failed,
            },
            Arc::clone(&subscribers),
            activity_tx,
        ));

        Ok(Self {
            page,
            options,
            activity,
            subscribers,
            next_subscription: AtomicU64::new(1),
            monitor,
        })
    }
}

/// The page's network event streams, one per CDP event kind.
///
/// `sent` yields `(request id, url)`; the others yield the request id.
struct NetworkEvents<S, R, F, X> {
    sent: S,
    responded: R,
    finished: F,
    failed: X,
}

/// Tracks requests, fans finished ones out to subscribers and publishes activity.
///
/// The handler queues a request's events in protocol order, but on separate
/// streams. Before a terminal event is applied, the streams it depends on are
/// drained of whatever is already queued, so a finish never overtakes its own
/// `requestWillBeSent` or `responseReceived`.
async fn monitor_network<S, R, F, X>(
    events: NetworkEvents<S, R, F, X>,
    subscribers: Subscribers,
    activity: watch::Sender<NetworkActivity>,
) where
    S: Stream<Item = (String, String)> + Unpin,
    R: Stream<Item = String> + Unpin,
    F: Stream<Item = String> + Unpin,
    X: Stream<Item = String> + Unpin,
{
    let NetworkEvents {
        mut sent,
        mut responded,
        mut finished,
        mut failed,
    } = events;
    let mut tracker = RequestTracker::default();

    loop {
        tokio::select! {
            biased;
            Some((id, url)) = sent.next() => tracker.sent(&id, &url),
            Some(id) = responded.next() => tracker.responded(&id),
            Some(id) = finished.next() => {
                drain_sent(&mut sent, &mut tracker);
                while let Some(Some(queued)) = responded.next().now_or_never() {
                    tracker.responded(&queued);
                }
                if let Some(request) = tracker.finished(&id) {
                    trace!(url = %request.url, "request finished");
                    let subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
                    for sender in subscribers.values() {
                        let _ = sender.send(request.clone());
                    }
                }
            }
            Some(id) = failed.next() => {
                drain_sent(&mut sent, &mut tracker);
                tracker.failed(&id);
            }
            else => break,
        }
        activity.send_modify(|activity| {
            activity.inflight = tracker.inflight();
            activity.events = activity.events.wrapping_add(1);
        });
    }
    debug!("network monitor stopped");
}

fn drain_sent<S>(sent: &mut S, tracker: &mut RequestTracker)
where
    S: Stream<Item = (String, String)> + Unpin,
{
    while let Some(Some((id, url))) = sent.next().now_or_never() {
        tracker.sent(&id, &url);
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

#[async_trait]
impl Page for ChromiumPage {
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn goto(&self, url: &Url) -> Result<(), PageError> {
        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| PageError::navigation(url.as_str(), e.to_string()))?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn wait_for_network_idle(&self) -> Result<(), PageError> {
        let mut activity = self.activity.clone();
        let idle_time = self.options.idle_time;
        let quiet = async move {
            loop {
                let inflight = activity.borrow_and_update().inflight;
                if inflight == 0 {
                    tokio::select! {
                        () = tokio::time::sleep(idle_time) => return Ok::<(), PageError>(()),
                        changed = activity.changed() => changed.map_err(|_| PageError::Closed)?,
                    }
                } else {
                    activity.changed().await.map_err(|_| PageError::Closed)?;
                }
            }
        };

        let timeout = self.options.idle_timeout;
        tokio::time::timeout(timeout, quiet)
            .await
            .map_err(|_| PageError::IdleTimeout { timeout })?
    }

    #[instrument(level = "debug", skip(self))]
    async fn item_links(&self, selector: &str) -> Result<Vec<RawLink>, PageError> {
        let selector =
            serde_json::to_string(selector).map_err(|e| PageError::script(e.to_string()))?;
        let script = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({selector})).map((item) => ({{ \
             text: item.textContent, href: item.getAttribute('href') }})))"
        );
        let json: String = self
            .page
            .evaluate(script.as_str())
            .await
            .map_err(|e| PageError::script(e.to_string()))?
            .into_value()
            .map_err(|e| PageError::script(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| PageError::script(e.to_string()))
    }

    async fn subscribe_finished_requests(&self) -> Result<Subscription, PageError> {
        if self.monitor.is_finished() {
            return Err(PageError::subscription("network monitor is not running"));
        }
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (sender, events) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);
        Ok(Subscription { id, events })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    #[instrument(level = "debug", skip(self), fields(url = %request.url))]
    async fn response_body(&self, request: &FinishedRequest) -> Result<Vec<u8>, PageError> {
        let params = GetResponseBodyParams::new(RequestId::new(request.request_id.clone()));
        let response = self
            .page
            .execute(params)
            .await
            .map_err(|e| PageError::response_body(&request.url, e.to_string()))?;
        let body = &response.result;
        if body.base64_encoded {
            BASE64_STANDARD
                .decode(&body.body)
                .map_err(|e| PageError::response_body(&request.url, e.to_string()))
        } else {
            Ok(body.body.clone().into_bytes())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::task::Poll;

    use futures_util::stream;

    use super::*;

    /// Stream whose next item is only handed out on the poll after the one
    /// that first asks for it, as if the handler queued it a moment late.
    fn lagging<T: Unpin>(items: Vec<T>) -> impl Stream<Item = T> + Unpin {
        let mut items = VecDeque::from(items);
        let mut armed = false;
        stream::poll_fn(move |cx| {
            if items.is_empty() {
                return Poll::Pending;
            }
            if armed {
                armed = false;
                return Poll::Ready(items.pop_front());
            }
            armed = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        })
    }

    /// Stream with every item ready that then stays open.
    fn queued<T: Unpin>(items: Vec<T>) -> impl Stream<Item = T> + Unpin {
        stream::iter(items).chain(stream::pending())
    }

    fn subscribed() -> (Subscribers, mpsc::UnboundedReceiver<FinishedRequest>) {
        let subscribers: Subscribers = Arc::default();
        let (sender, events) = mpsc::unbounded_channel();
        subscribers.lock().unwrap().insert(SubscriptionId(1), sender);
        (subscribers, events)
    }

    #[test]
    fn test_chromium_options_defaults() {
        let options = ChromiumOptions::default();
        assert!(options.headless);
        assert!(options.chrome_executable.is_none());
        assert_eq!(options.idle_time, Duration::from_millis(500));
        assert_eq!(options.idle_timeout, Duration::from_secs(30));
        assert_eq!(options.max_resource_buffer_size, 1024 * 1204 * 100);
        assert_eq!(options.max_total_buffer_size, 2 * options.max_resource_buffer_size);
    }

    #[test]
    fn test_tracker_reports_finished_request_with_response() {
        let mut tracker = RequestTracker::default();
        tracker.sent("7.1", "https://api.example.com/files/7/download");
        tracker.responded("7.1");
        assert_eq!(tracker.inflight(), 1);

        let request = tracker.finished("7.1").unwrap();
        assert_eq!(request.request_id, "7.1");
        assert_eq!(request.url, "https://api.example.com/files/7/download");
        assert!(request.has_response);
        assert_eq!(tracker.inflight(), 0);
    }

    #[test]
    fn test_tracker_finished_without_response() {
        let mut tracker = RequestTracker::default();
        tracker.sent("7.1", "https://api.example.com/files/7/download");

        let request = tracker.finished("7.1").unwrap();
        assert!(!request.has_response);
    }

    #[test]
    fn test_tracker_redirect_keeps_id_and_moves_url() {
        let mut tracker = RequestTracker::default();
        tracker.sent("9.4", "https://share.example.com/s/abc/file/9/download");
        tracker.sent("9.4", "https://cdn.example.net/blob/9");
        assert_eq!(tracker.inflight(), 1);

        let request = tracker.finished("9.4").unwrap();
        assert_eq!(request.url, "https://cdn.example.net/blob/9");
    }

    #[test]
    fn test_tracker_failed_request_is_no_longer_inflight() {
        let mut tracker = RequestTracker::default();
        tracker.sent("3.2", "https://share.example.com/app.js");
        tracker.sent("3.3", "https://share.example.com/app.css");
        tracker.failed("3.2");

        assert_eq!(tracker.inflight(), 1);
        assert!(tracker.finished("3.2").is_none());
    }

    #[test]
    fn test_tracker_ignores_events_for_unknown_ids() {
        let mut tracker = RequestTracker::default();
        tracker.responded("1.1");
        assert!(tracker.finished("1.1").is_none());
        tracker.failed("1.1");
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test]
    async fn test_monitor_delivers_finish_seen_before_its_send_and_response() {
        let (subscribers, mut events) = subscribed();
        let (activity_tx, mut activity) = watch::channel(NetworkActivity::default());
        let url = "https://api.example.com/files/7/download".to_string();

        let monitor = tokio::spawn(monitor_network(
            NetworkEvents {
                sent: lagging(vec![("7.1".to_string(), url.clone())]),
                responded: lagging(vec!["7.1".to_string()]),
                finished: queued(vec!["7.1".to_string()]),
                failed: queued(Vec::<String>::new()),
            },
            subscribers,
            activity_tx,
        ));

        let request = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.request_id, "7.1");
        assert_eq!(request.url, url);
        assert!(request.has_response);

        let idle = *activity.wait_for(|activity| activity.events > 0).await.unwrap();
        assert_eq!(idle.inflight, 0);
        monitor.abort();
    }

    #[tokio::test]
    async fn test_monitor_failure_seen_before_its_send_leaves_nothing_inflight() {
        let (subscribers, mut events) = subscribed();
        let (activity_tx, mut activity) = watch::channel(NetworkActivity::default());

        let monitor = tokio::spawn(monitor_network(
            NetworkEvents {
                sent: lagging(vec![(
                    "4.2".to_string(),
                    "https://share.example.com/thumb.png".to_string(),
                )]),
                responded: queued(Vec::<String>::new()),
                finished: queued(Vec::<String>::new()),
                failed: queued(vec!["4.2".to_string()]),
            },
            subscribers,
            activity_tx,
        ));

        let after_failure = *activity.wait_for(|activity| activity.events > 0).await.unwrap();
        assert_eq!(after_failure.inflight, 0);

        tokio::task::yield_now().await;
        assert_eq!(activity.borrow().inflight, 0);
        assert!(events.try_recv().is_err());
        monitor.abort();
    }

    #[tokio::test]
    async fn test_monitor_stops_when_every_stream_ends() {
        let (subscribers, _events) = subscribed();
        let (activity_tx, _activity) = watch::channel(NetworkActivity::default());

        let monitor = tokio::spawn(monitor_network(
            NetworkEvents {
                sent: stream::iter(vec![("1.1".to_string(), "https://share.example.com/".to_string())]),
                responded: stream::iter(Vec::<String>::new()),
                finished: stream::iter(vec!["1.1".to_string()]),
                failed: stream::iter(Vec::<String>::new()),
            },
            subscribers,
            activity_tx,
        ));

        tokio::time::timeout(Duration::from_secs(5), monitor)
            .await
            .unwrap()
            .unwrap();
    }
}

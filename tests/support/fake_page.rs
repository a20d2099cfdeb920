//! Scripted in-memory [`Page`] standing in for a browser-rendered share.
//!
//! Folder URLs map to the item links their listing renders. File URLs map to
//! a payload body; navigating to a file page emits an unrelated asset request
//! followed by the payload request `<file url>/download`. Navigation to any URL
//! can be made to fail a fixed number of times, and file pages can be made to
//! never emit their payload.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use share_mirror_core::page::{FinishedRequest, PageError, Subscription, SubscriptionId};
use share_mirror_core::{Page, RawLink};
use tokio::sync::mpsc;
use url::Url;

pub const SHARE: &str = "https://share.example.com/s/abc";

/// Absolute URL below the test share.
pub fn share_url(path: &str) -> Url {
    Url::parse(&format!("{SHARE}{path}")).expect("valid share url")
}

#[derive(Default)]
pub struct FakePage {
    folders: HashMap<String, Vec<RawLink>>,
    files: HashMap<String, Vec<u8>>,
    stalled: HashSet<String>,
    failures: Mutex<HashMap<String, usize>>,
    current: Mutex<Option<String>>,
    navigations: Mutex<Vec<String>>,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<FinishedRequest>>>,
    next_subscription: AtomicU64,
    subscribed: AtomicUsize,
    unsubscribed: AtomicUsize,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a folder page rendering `links` as `(text, href)` pairs.
    pub fn folder(mut self, url: &Url, links: &[(&str, &str)]) -> Self {
        let links = links
            .iter()
            .map(|(text, href)| RawLink::new(*text, *href))
            .collect();
        self.folders.insert(url.to_string(), links);
        self
    }

    /// Registers a folder page rendering arbitrary raw links.
    pub fn raw_folder(mut self, url: &Url, links: Vec<RawLink>) -> Self {
        self.folders.insert(url.to_string(), links);
        self
    }

    /// Registers a file page whose payload is `body`.
    pub fn file(mut self, url: &Url, body: &[u8]) -> Self {
        self.files.insert(url.to_string(), body.to_vec());
        self
    }

    /// Makes the next `times` navigations to `url` fail.
    pub fn fail_navigation(self, url: &Url, times: usize) -> Self {
        self.failures
            .lock()
            .expect("failures lock")
            .insert(url.to_string(), times);
        self
    }

    /// Makes the file page at `url` never emit its payload request.
    pub fn stall(mut self, url: &Url) -> Self {
        self.stalled.insert(url.to_string());
        self
    }

    /// Every navigation attempted, in order, failed ones included.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().expect("navigations lock").clone()
    }

    /// Number of navigations attempted to `url`.
    pub fn navigations_to(&self, url: &Url) -> usize {
        self.navigations()
            .iter()
            .filter(|visited| visited.as_str() == url.as_str())
            .count()
    }

    pub fn subscribed(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn unsubscribed(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    /// Subscriptions still registered.
    pub fn live_subscriptions(&self) -> usize {
        self.subscribers.lock().expect("subscribers lock").len()
    }

    fn emit(&self, request: FinishedRequest) {
        for sender in self.subscribers.lock().expect("subscribers lock").values() {
            let _ = sender.send(request.clone());
        }
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &Url) -> Result<(), PageError> {
        let key = url.to_string();
        self.navigations
            .lock()
            .expect("navigations lock")
            .push(key.clone());

        {
            let mut failures = self.failures.lock().expect("failures lock");
            if let Some(remaining) = failures.get_mut(&key).filter(|remaining| **remaining > 0) {
                *remaining -= 1;
                return Err(PageError::navigation(&key, "net::ERR_CONNECTION_RESET"));
            }
        }

        *self.current.lock().expect("current lock") = Some(key.clone());

        if self.files.contains_key(&key) && !self.stalled.contains(&key) {
            self.emit(FinishedRequest {
                request_id: format!("asset:{key}"),
                url: format!("{SHARE}/static/app.js"),
                has_response: true,
            });
            let payload = format!("{key}/download");
            self.emit(FinishedRequest {
                request_id: payload.clone(),
                url: payload,
                has_response: true,
            });
        }
        Ok(())
    }

    async fn wait_for_network_idle(&self) -> Result<(), PageError> {
        Ok(())
    }

    async fn item_links(&self, _selector: &str) -> Result<Vec<RawLink>, PageError> {
        let current = self.current.lock().expect("current lock").clone();
        current
            .and_then(|url| self.folders.get(&url).cloned())
            .ok_or_else(|| PageError::script("no listing rendered on current page"))
    }

    async fn subscribe_finished_requests(&self) -> Result<Subscription, PageError> {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (sender, events) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("subscribers lock")
            .insert(id, sender);
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        Ok(Subscription {
            id: SubscriptionId(id),
            events,
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .expect("subscribers lock")
            .remove(&id.0);
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
    }

    async fn response_body(&self, request: &FinishedRequest) -> Result<Vec<u8>, PageError> {
        let file_url = request
            .request_id
            .strip_suffix("/download")
            .unwrap_or(&request.request_id);
        self.files
            .get(file_url)
            .cloned()
            .ok_or_else(|| PageError::response_body(&request.url, "no resource with given identifier"))
    }
}

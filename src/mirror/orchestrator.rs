//! Breadth-first traversal of a remote share and sequential retrieval.
//!
//! The run has two phases over two FIFO worklists:
//!
//! 1. **Expand folders.** The root is listed once and seeds both worklists.
//!    Folders are then popped from the front and listed, their subfolders
//!    appended to the folder worklist and their files to the file worklist,
//!    in page order. Every folder at depth *d* is listed before any folder at
//!    depth *d + 1*.
//! 2. **Retrieve files.** Only once no folder is pending, files are popped
//!    from the front, captured and written one at a time.
//!
//! Each listing and each capture is retried by [`with_retry`]; the first
//! failure that survives its retries aborts the run. Files written before that
//! point stay on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, instrument};
use url::Url;

use super::capture::{DEFAULT_CAPTURE_TIMEOUT, DEFAULT_DOWNLOAD_SUFFIX, FileRetriever};
use super::enumerate::{DEFAULT_ITEM_SELECTOR, FolderEnumerator};
use super::retry::{RetryPolicy, with_retry};
use super::storage::{DEFAULT_OUTPUT_DIR, destination_path, write_file};
use super::worklist::{Entry, Worklist};
use crate::error::{MirrorError, classify_failure};
use crate::page::Page;
use crate::remote::{Item, ItemKind};

/// Tuning for one mirror run.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Root directory receiving the mirrored tree.
    pub output_dir: PathBuf,
    /// Retry cap applied to each listing and each capture.
    pub retry_policy: RetryPolicy,
    /// CSS selector of item links on folder pages.
    pub item_selector: String,
    /// URL suffix of the internal payload request.
    pub download_suffix: String,
    /// Capture window per file.
    pub capture_timeout: Duration,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            retry_policy: RetryPolicy::default(),
            item_selector: DEFAULT_ITEM_SELECTOR.to_string(),
            download_suffix: DEFAULT_DOWNLOAD_SUFFIX.to_string(),
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }
}

/// Live counters of a mirror run, readable from other tasks.
#[derive(Debug, Default)]
pub struct MirrorStats {
    folders_listed: AtomicUsize,
    files_discovered: AtomicUsize,
    files_written: AtomicUsize,
    bytes_written: AtomicU64,
    retries: AtomicUsize,
    retrieving: AtomicBool,
}

impl MirrorStats {
    /// Folders listed so far, root included.
    #[must_use]
    pub fn folders_listed(&self) -> usize {
        self.folders_listed.load(Ordering::SeqCst)
    }

    /// Files discovered so far.
    #[must_use]
    pub fn files_discovered(&self) -> usize {
        self.files_discovered.load(Ordering::SeqCst)
    }

    /// Files written so far.
    #[must_use]
    pub fn files_written(&self) -> usize {
        self.files_written.load(Ordering::SeqCst)
    }

    /// Payload bytes written so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    /// Failed attempts that were retried.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    /// Whether the run has moved on to retrieving files.
    #[must_use]
    pub fn is_retrieving(&self) -> bool {
        self.retrieving.load(Ordering::SeqCst)
    }

    /// Copies the current counters.
    #[must_use]
    pub fn snapshot(&self) -> MirrorSummary {
        MirrorSummary {
            folders_listed: self.folders_listed(),
            files_discovered: self.files_discovered(),
            files_written: self.files_written(),
            bytes_written: self.bytes_written(),
            retries: self.retries(),
        }
    }

    fn record_attempts(&self, attempts: u32) {
        let retried = usize::try_from(attempts.saturating_sub(1)).unwrap_or(usize::MAX);
        self.retries.fetch_add(retried, Ordering::SeqCst);
    }
}

/// Final counters of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MirrorSummary {
    /// Folders listed, root included.
    pub folders_listed: usize,
    /// Files discovered.
    pub files_discovered: usize,
    /// Files written.
    pub files_written: usize,
    /// Payload bytes written.
    pub bytes_written: u64,
    /// Failed attempts that were retried.
    pub retries: usize,
}

/// Mirrors a remote share through one shared browser page.
pub struct Mirror<'a> {
    enumerator: FolderEnumerator<'a>,
    retriever: FileRetriever<'a>,
    options: MirrorOptions,
    stats: Arc<MirrorStats>,
}

impl<'a> Mirror<'a> {
    /// Creates a mirror driving `page`.
    #[must_use]
    pub fn new(page: &'a dyn Page, options: MirrorOptions) -> Self {
        debug!(
            output_dir = %options.output_dir.display(),
            max_attempts = options.retry_policy.max_attempts(),
            capture_timeout_ms = options.capture_timeout.as_millis(),
            "creating mirror"
        );
        Self {
            enumerator: FolderEnumerator::new(page, options.item_selector.clone()),
            retriever: FileRetriever::new(
                page,
                options.download_suffix.clone(),
                options.capture_timeout,
            ),
            options,
            stats: Arc::new(MirrorStats::default()),
        }
    }

    /// Returns the live counters of this mirror.
    #[must_use]
    pub fn stats(&self) -> Arc<MirrorStats> {
        Arc::clone(&self.stats)
    }

    /// Mirrors the tree below `root` into the output directory.
    ///
    /// # Errors
    ///
    /// Returns the first listing, capture, or write failure that survived its
    /// retries. Nothing after that point is attempted.
    #[instrument(skip(self), fields(root = %root, output_dir = %self.options.output_dir.display()))]
    pub async fn run(&self, root: &Url) -> Result<MirrorSummary, MirrorError> {
        info!("starting mirror");
        let files = self.discover(root).await?;
        self.retrieve_all(files).await?;

        let summary = self.stats.snapshot();
        info!(
            folders = summary.folders_listed,
            files = summary.files_written,
            bytes = summary.bytes_written,
            retries = summary.retries,
            "mirror complete"
        );
        Ok(summary)
    }

    /// Lists the whole tree breadth-first and returns the pending files.
    ///
    /// # Errors
    ///
    /// Returns the first listing failure that survived its retries.
    pub async fn discover(&self, root: &Url) -> Result<Worklist, MirrorError> {
        let mut folders = Worklist::new();
        let mut files = Worklist::new();

        let root_items = self.list_folder(root).await?;
        self.enqueue(&mut folders, &mut files, "", root_items);

        while let Some(folder) = folders.pop() {
            let items = self.list_folder(&folder.url).await?;
            self.enqueue(&mut folders, &mut files, &folder.relative_path, items);
        }

        debug!(files = files.len(), "folder expansion finished");
        Ok(files)
    }

    /// Captures and writes every pending file, front to back.
    ///
    /// # Errors
    ///
    /// Returns the first capture failure that survived its retries, or the
    /// first write failure.
    pub async fn retrieve_all(&self, mut files: Worklist) -> Result<(), MirrorError> {
        self.stats.retrieving.store(true, Ordering::SeqCst);

        while let Some(entry) = files.pop() {
            let bytes = self.fetch_file(&entry.url).await?;
            let path = destination_path(&self.options.output_dir, &entry.relative_path);
            write_file(&path, &bytes).await?;

            self.stats.files_written.fetch_add(1, Ordering::SeqCst);
            self.stats
                .bytes_written
                .fetch_add(bytes.len() as u64, Ordering::SeqCst);
            info!(path = %path.display(), bytes = bytes.len(), "file saved");
        }
        Ok(())
    }

    async fn list_folder(&self, url: &Url) -> Result<Vec<Item>, MirrorError> {
        let mut attempts = 0;
        let result = with_retry(&self.options.retry_policy, || {
            attempts += 1;
            self.enumerator.enumerate(url)
        })
        .await;
        self.record_outcome(url, attempts, result.as_ref().err());

        let items = result?;
        self.stats.folders_listed.fetch_add(1, Ordering::SeqCst);
        Ok(items)
    }

    async fn fetch_file(&self, url: &Url) -> Result<Vec<u8>, MirrorError> {
        let mut attempts = 0;
        let result = with_retry(&self.options.retry_policy, || {
            attempts += 1;
            self.retriever.retrieve(url)
        })
        .await;
        self.record_outcome(url, attempts, result.as_ref().err());
        result
    }

    fn record_outcome(&self, url: &Url, attempts: u32, failure: Option<&MirrorError>) {
        self.stats.record_attempts(attempts);
        if let Some(failure) = failure {
            error!(
                %url,
                attempts,
                failure = classify_failure(failure).as_str(),
                error = %failure,
                "giving up"
            );
        }
    }

    fn enqueue(
        &self,
        folders: &mut Worklist,
        files: &mut Worklist,
        parent_path: &str,
        items: Vec<Item>,
    ) {
        for item in items {
            let entry = Entry::child(parent_path, &item);
            match item.kind {
                ItemKind::Folder => folders.push(entry),
                ItemKind::File => {
                    self.stats.files_discovered.fetch_add(1, Ordering::SeqCst);
                    files.push(entry);
                }
            }
        }
    }
}

//! Traversal and retrieval engine.
//!
//! # Overview
//!
//! - [`FolderEnumerator`] lists one folder page into [`Item`](crate::remote::Item)s
//! - [`FileRetriever`] captures one file's payload from the page's network traffic
//! - [`with_retry`] retries either operation up to a fixed cap
//! - [`Mirror`] walks the tree breadth-first, then retrieves files in order
//!
//! # Example
//!
//! ```no_run
//! use share_mirror_core::mirror::{Mirror, MirrorOptions};
//! use share_mirror_core::page::{BrowserSession, ChromiumOptions};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = BrowserSession::launch(ChromiumOptions::default()).await?;
//! let root = Url::parse("https://share.example.com/s/abc/folder/1")?;
//! let summary = Mirror::new(session.page(), MirrorOptions::default())
//!     .run(&root)
//!     .await;
//! session.close().await;
//! println!("Mirrored {} files", summary?.files_written);
//! # Ok(())
//! # }
//! ```

mod capture;
mod enumerate;
mod orchestrator;
mod retry;
mod storage;
mod worklist;

pub use capture::{DEFAULT_CAPTURE_TIMEOUT, DEFAULT_DOWNLOAD_SUFFIX, FileRetriever};
pub use enumerate::{DEFAULT_ITEM_SELECTOR, FolderEnumerator};
pub use orchestrator::{Mirror, MirrorOptions, MirrorStats, MirrorSummary};
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryDecision, RetryPolicy, with_retry};
pub use storage::{DEFAULT_OUTPUT_DIR, destination_path, write_file};
pub use worklist::{Entry, Worklist, child_path};

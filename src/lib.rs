//! Share Mirror Core Library
//!
//! This library mirrors a browser-rendered remote file share to a local
//! directory tree. Folder pages and file pages are only usable through a real
//! browser, so every remote interaction goes through one shared [`Page`].
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`remote`] - Item model and URL-shape classification
//! - [`page`] - Browser page abstraction and its Chromium implementation
//! - [`mirror`] - Folder listing, payload capture, retry and traversal
//! - [`error`] - Error type shared by the mirror engine

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod mirror;
pub mod page;
pub mod remote;

// Re-export commonly used types
pub use error::{FailureType, MirrorError, classify_failure};
pub use mirror::{
    DEFAULT_MAX_ATTEMPTS, Mirror, MirrorOptions, MirrorStats, MirrorSummary, RetryPolicy,
};
pub use page::{BrowserSession, ChromiumOptions, Page, PageError};
pub use remote::{Item, ItemKind, RawLink, classify};

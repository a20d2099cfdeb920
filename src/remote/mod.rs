//! Remote share data model and item classification.
//!
//! A folder page lists its children as item links. Each link is first read as
//! a [`RawLink`] (whatever the page rendered), then validated into an [`Item`]
//! whose [`ItemKind`] is derived purely from the shape of its absolute URL:
//!
//! - `.../file/<digits>` is a [`ItemKind::File`]
//! - `.../folder/<digits>` is a [`ItemKind::Folder`]
//!
//! Any other shape means the site layout changed and is reported as
//! [`MirrorError::UnknownItemKind`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::trace;
use url::Url;

use crate::error::MirrorError;

#[allow(clippy::expect_used)]
static FILE_URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/\d+$").expect("file URL regex is valid"));

#[allow(clippy::expect_used)]
static FOLDER_URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/folder/\d+$").expect("folder URL regex is valid"));

/// Whether a remote item is a folder to expand or a file to retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// A folder page listing further items.
    Folder,
    /// A file page whose payload is captured from the network.
    File,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Folder => f.write_str("folder"),
            Self::File => f.write_str("file"),
        }
    }
}

/// An item link as rendered on a folder page, before validation.
///
/// Both fields are optional because the page may render incompletely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawLink {
    /// Display text of the link (the item name).
    pub text: Option<String>,
    /// Raw `href` attribute, relative or absolute.
    pub href: Option<String>,
}

impl RawLink {
    /// Creates a link with both text and href present.
    #[must_use]
    pub fn new(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            href: Some(href.into()),
        }
    }
}

/// A validated child of a remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Folder or file.
    pub kind: ItemKind,
    /// Display name, used verbatim as the local path component.
    pub name: String,
    /// Absolute URL of the item's page.
    pub url: Url,
}

/// Classifies an absolute URL by its trailing path shape.
///
/// # Errors
///
/// Returns [`MirrorError::UnknownItemKind`] when the URL ends in neither
/// `/file/<digits>` nor `/folder/<digits>`.
pub fn classify(url: &Url) -> Result<ItemKind, MirrorError> {
    let raw = url.as_str();
    let kind = if FILE_URL_PATTERN.is_match(raw) {
        ItemKind::File
    } else if FOLDER_URL_PATTERN.is_match(raw) {
        ItemKind::Folder
    } else {
        return Err(MirrorError::unknown_item_kind(raw));
    };
    trace!(url = raw, %kind, "classified item");
    Ok(kind)
}

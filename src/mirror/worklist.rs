//! Pending folder and file entries.

use std::collections::VecDeque;
use std::path::MAIN_SEPARATOR;

use url::Url;

use crate::remote::Item;

/// A discovered remote node paired with its destination-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path below the output directory, components joined with the OS separator.
    pub relative_path: String,
    /// Absolute URL of the node's page.
    pub url: Url,
}

impl Entry {
    /// Builds the entry for `item` listed inside the folder at `parent_path`.
    ///
    /// The root folder has an empty `parent_path`, so its children get no
    /// leading separator.
    #[must_use]
    pub fn child(parent_path: &str, item: &Item) -> Self {
        Self {
            relative_path: child_path(parent_path, &item.name),
            url: item.url.clone(),
        }
    }
}

/// Joins a parent relative path and a child name.
#[must_use]
pub fn child_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}{MAIN_SEPARATOR}{name}")
    }
}

/// FIFO queue of entries: consumed from the front, appended at the back.
#[derive(Debug, Clone, Default)]
pub struct Worklist {
    entries: VecDeque<Entry>,
}

impl Worklist {
    /// Creates an empty worklist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry at the back.
    pub fn push(&mut self, entry: Entry) {
        self.entries.push_back(entry);
    }

    /// Removes and returns the front entry.
    pub fn pop(&mut self) -> Option<Entry> {
        self.entries.pop_front()
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates pending entries front to back without consuming them.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }
}

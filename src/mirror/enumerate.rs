//! Listing the immediate children of one remote folder.

use tracing::{debug, info, instrument};
use url::Url;

use crate::error::MirrorError;
use crate::page::Page;
use crate::remote::{Item, RawLink, classify};

/// CSS selector matching item links on a folder page.
pub const DEFAULT_ITEM_SELECTOR: &str = ".item-link";

/// Lists folder pages through the shared browser page.
pub struct FolderEnumerator<'a> {
    page: &'a dyn Page,
    selector: String,
}

impl<'a> FolderEnumerator<'a> {
    /// Creates an enumerator matching item links with `selector`.
    #[must_use]
    pub fn new(page: &'a dyn Page, selector: impl Into<String>) -> Self {
        Self {
            page,
            selector: selector.into(),
        }
    }

    /// Returns the children of the folder at `folder_url`, in page order.
    ///
    /// # Errors
    ///
    /// Page failures (navigation, idle wait, script) are returned as
    /// [`MirrorError::Page`]. A link without text or href, an href that does
    /// not resolve, or a URL of unknown shape fails the whole listing.
    #[instrument(skip(self), fields(url = %folder_url))]
    pub async fn enumerate(&self, folder_url: &Url) -> Result<Vec<Item>, MirrorError> {
        info!("scraping {folder_url}");

        self.page.goto(folder_url).await?;
        self.page.wait_for_network_idle().await?;

        let links = self.page.item_links(&self.selector).await?;
        let items = links
            .into_iter()
            .map(|link| to_item(folder_url, link))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = items.len(), "folder listed");
        Ok(items)
    }
}

/// Validates one raw link into an item with an absolute URL.
fn to_item(folder_url: &Url, link: RawLink) -> Result<Item, MirrorError> {
    let name = link
        .text
        .ok_or_else(|| MirrorError::missing_link_text(folder_url.as_str()))?;
    let href = link
        .href
        .ok_or_else(|| MirrorError::missing_link_href(folder_url.as_str(), &name))?;
    let url = folder_url
        .join(&href)
        .map_err(|e| MirrorError::invalid_url(folder_url.as_str(), &href, e))?;
    let kind = classify(&url)?;
    Ok(Item { kind, name, url })
}

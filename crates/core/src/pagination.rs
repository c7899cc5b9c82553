//! Forward-only cursor paging over ordered queries.

use async_trait::async_trait;
use coterie_common::AppResult;

/// An ordered query that can be read in pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Item type.
    type Item: Send;
    /// Sort key the next page starts after.
    type Cursor: Clone + Send + Sync;

    /// Fetch up to `limit` items strictly after `after`.
    async fn fetch(&self, after: Option<&Self::Cursor>, limit: u64) -> AppResult<Vec<Self::Item>>;

    /// Sort key of an item.
    fn cursor_of(&self, item: &Self::Item) -> Self::Cursor;
}

/// Cursor pager.
///
/// A page that exactly fills the page size is assumed to have a successor,
/// so the final call at the true end of the data may return an empty page.
pub struct CursorPager<S: PageSource> {
    source: S,
    cursor: Option<S::Cursor>,
    page_size: u64,
    has_more: bool,
}

impl<S: PageSource> CursorPager<S> {
    /// Create a pager. A page size of zero is raised to one.
    #[must_use]
    pub fn new(source: S, page_size: u64) -> Self {
        Self {
            source,
            cursor: None,
            page_size: page_size.max(1),
            has_more: true,
        }
    }

    /// Whether another page may exist.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    /// Fetch the next page, or `None` once the data is exhausted.
    pub async fn next_page(&mut self) -> AppResult<Option<Vec<S::Item>>> {
        if !self.has_more {
            return Ok(None);
        }

        let page = self
            .source
            .fetch(self.cursor.as_ref(), self.page_size)
            .await?;

        self.has_more = page.len() as u64 == self.page_size;
        if let Some(last) = page.last() {
            self.cursor = Some(self.source.cursor_of(last));
        }

        Ok(Some(page))
    }

    /// Drain every remaining page into one list.
    pub async fn collect_all(mut self) -> AppResult<Vec<S::Item>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}

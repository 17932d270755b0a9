//! Paged result cursor
//!
//! Presents a paginated scan as a lazy sequence of rows.
//!
//! The underlying transport answers two separate questions: "are more
//! pages pending" and "give me the next page". An empty page does not mean
//! the scan is over while the transport still reports pages pending, so
//! the cursor keeps the two apart and exposes a peek-then-take protocol:
//! [`PagedResultCursor::has_more`] followed by [`PagedResultCursor::next`].

use crate::error::{Error, Result};
use crate::types::JsonValue;
use async_trait::async_trait;
use std::collections::VecDeque;

/// Page-at-a-time access to a scan
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Whether the transport reports more pages pending
    fn has_more_pages(&self) -> bool;

    /// Fetch the next page; may be empty even when more pages follow
    async fn next_page(&mut self) -> Result<Vec<JsonValue>>;

    /// Release the scan
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Result of a single [`PagedResultCursor::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// A buffered row is ready
    Ready,
    /// The fetched page was empty but more pages are pending
    Pending,
    /// No rows remain
    Exhausted,
}

/// Buffered cursor over a [`PageFetcher`]
#[derive(Debug)]
pub struct PagedResultCursor<F> {
    fetcher: F,
    page: VecDeque<JsonValue>,
    pages_fetched: u64,
    exhausted: bool,
}

impl<F: PageFetcher> PagedResultCursor<F> {
    /// Wrap a fetcher; no page is fetched until the first `has_more`
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            page: VecDeque::new(),
            pages_fetched: 0,
            exhausted: false,
        }
    }

    /// Fetch at most one page and report whether a row is ready
    pub async fn advance(&mut self) -> Result<CursorState> {
        if !self.page.is_empty() {
            return Ok(CursorState::Ready);
        }
        if self.exhausted || !self.fetcher.has_more_pages() {
            self.exhausted = true;
            return Ok(CursorState::Exhausted);
        }

        let rows = self.fetcher.next_page().await?;
        self.pages_fetched += 1;
        self.page.extend(rows);

        if !self.page.is_empty() {
            Ok(CursorState::Ready)
        } else if self.fetcher.has_more_pages() {
            Ok(CursorState::Pending)
        } else {
            self.exhausted = true;
            Ok(CursorState::Exhausted)
        }
    }

    /// True if a row is ready, fetching at most one page to find out
    ///
    /// False is ambiguous: an empty page may have arrived while the
    /// transport still reports pages pending. Check [`Self::is_exhausted`]
    /// (or use [`Self::advance`]) before treating false as the end. Once the
    /// scan is exhausted this keeps returning false without touching the
    /// transport.
    pub async fn has_more(&mut self) -> Result<bool> {
        Ok(self.advance().await? == CursorState::Ready)
    }

    /// Take the next buffered row
    ///
    /// Must follow a `has_more` that returned true.
    pub fn next(&mut self) -> Result<JsonValue> {
        self.page
            .pop_front()
            .ok_or_else(|| Error::scan("next() called without a ready row"))
    }

    /// Pages fetched so far
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Whether the scan has been read to the end
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.page.is_empty()
    }

    /// Release the underlying scan; buffered rows are dropped
    pub async fn close(&mut self) -> Result<()> {
        self.page.clear();
        self.exhausted = true;
        self.fetcher.close().await
    }
}

//! The lazily-growing, keyset-paginated view of the record store. This is the
//! canonical list of committed records; row editors and the table only ever
//! observe it. Pages are fetched on demand and extension is serialized, so
//! two overlapping "load more" requests cannot fetch the same page twice.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::cache::{CacheKey, QueryCache};
use crate::error::Result;
use crate::models::Record;
use crate::pager::{is_last_page, PageCursor, PAGE_SIZE};
use crate::store::StoreRef;

struct ListState {
    pages: Vec<Vec<Record>>,
    exhausted: bool,
    loaded_epoch: u64,
}

pub struct RecordList {
    store: StoreRef,
    cache: Arc<QueryCache>,
    state: Mutex<ListState>,
    /// Serializes extension and refetch: at most one in-flight page walk.
    fetch_guard: tokio::sync::Mutex<()>,
}

impl RecordList {
    pub fn new(store: StoreRef, cache: Arc<QueryCache>) -> Self {
        let loaded_epoch = cache.epoch(CacheKey::Records);
        Self {
            store,
            cache,
            state: Mutex::new(ListState {
                pages: Vec::new(),
                exhausted: false,
                loaded_epoch,
            }),
            fetch_guard: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Flattened copy of every loaded page, newest first.
    pub fn rows(&self) -> Vec<Record> {
        self.state().pages.iter().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().pages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once a short page told us the store has no older records.
    pub fn is_exhausted(&self) -> bool {
        self.state().exhausted
    }

    /// True when a mutation invalidated the record cache after our last
    /// full (re)load.
    pub fn is_stale(&self) -> bool {
        let loaded_epoch = self.state().loaded_epoch;
        self.cache.is_stale(CacheKey::Records, loaded_epoch)
    }

    fn next_cursor(state: &ListState) -> PageCursor {
        state
            .pages
            .last()
            .and_then(|page| page.last())
            .map(PageCursor::after)
            .unwrap_or_else(PageCursor::initial)
    }

    /// Fetch one more page and append it. Returns how many records arrived
    /// (zero at end-of-data). Concurrent callers queue on the guard; the
    /// re-read of the cursor after acquisition keeps the later caller from
    /// repeating the page the earlier one just loaded.
    pub async fn fetch_next_page(&self) -> Result<usize> {
        let _guard = self.fetch_guard.lock().await;
        let (cursor, first_load) = {
            let state = self.state();
            if state.exhausted {
                return Ok(0);
            }
            (Self::next_cursor(&state), state.pages.is_empty())
        };
        let epoch = self.cache.epoch(CacheKey::Records);

        let page = self.store.get_records(PAGE_SIZE, cursor.date, cursor.id).await?;
        let fetched = page.len();
        debug!(fetched, "page loaded");

        let mut state = self.state();
        state.exhausted = is_last_page(fetched, PAGE_SIZE);
        if fetched > 0 {
            state.pages.push(page);
        }
        // Extension never advances the epoch: pages loaded earlier keep
        // whatever staleness they had. Only the very first page counts as a
        // full load.
        if first_load {
            state.loaded_epoch = epoch;
        }
        Ok(fetched)
    }

    /// Reload the already-materialized extent from scratch: walk pages from
    /// the initial cursor, re-deriving each cursor from the fresh data, until
    /// as many pages as are currently loaded have been fetched (at least
    /// one), then swap the result in.
    pub async fn refetch(&self) -> Result<()> {
        let _guard = self.fetch_guard.lock().await;
        let target_pages = self.state().pages.len().max(1);
        let epoch = self.cache.epoch(CacheKey::Records);

        let mut pages = Vec::with_capacity(target_pages);
        let mut cursor = PageCursor::initial();
        let mut exhausted = false;
        for _ in 0..target_pages {
            let page = self.store.get_records(PAGE_SIZE, cursor.date, cursor.id).await?;
            exhausted = is_last_page(page.len(), PAGE_SIZE);
            if let Some(last) = page.last() {
                cursor = PageCursor::after(last);
                pages.push(page);
            }
            if exhausted {
                break;
            }
        }
        debug!(pages = pages.len(), "list refreshed");

        let mut state = self.state();
        state.pages = pages;
        state.exhausted = exhausted;
        state.loaded_epoch = epoch;
        Ok(())
    }
}

//! Page-by-page loading of the visible result set.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::api::ApiResult;
use crate::models::Entry;
use crate::store::{pages_for, EntryStore, PAGE_SIZE};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Next page to fetch.
    pub page_index: usize,
    /// Every entry fetched so far for `query`, in page order.
    pub loaded: Vec<Entry>,
    /// No more pages to fetch for `query`.
    pub exhausted: bool,
    /// Active search; empty means plain paging.
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was fetched and appended.
    Loaded { page_index: usize, count: usize },
    /// The window was rebuilt from page 0.
    Reloaded { pages: usize, count: usize },
    /// Another fetch is in flight; nothing was done.
    Busy,
    /// Every page has already been loaded; nothing was done.
    Exhausted,
    /// The result arrived after the query or the store changed and was dropped.
    Stale,
}

/// Tracks the page window of the current query and fetches the next page on
/// demand. At most one fetch runs at a time.
#[derive(Default)]
pub struct PaginationCursor {
    state: Mutex<PaginationState>,
    /// Bumped on every reset; results fetched under an older epoch are dropped.
    epoch: AtomicU64,
    fetching: tokio::sync::Mutex<()>,
}

impl PaginationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PaginationState {
        self.state.lock().clone()
    }

    pub fn loaded(&self) -> Vec<Entry> {
        self.state.lock().loaded.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().loaded.is_empty()
    }

    pub fn query(&self) -> String {
        self.state.lock().query.clone()
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.lock().exhausted
    }

    pub fn is_loading(&self) -> bool {
        self.fetching.try_lock().is_err()
    }

    /// Switch to a new search. Any change, including clearing the query,
    /// resets the window. Returns whether the query changed.
    pub fn set_query(&self, query: &str) -> bool {
        let mut state = self.state.lock();
        if state.query == query {
            return false;
        }
        *state = PaginationState {
            query: query.to_string(),
            ..PaginationState::default()
        };
        self.epoch.fetch_add(1, Ordering::SeqCst);
        debug!(query, "Search changed, pagination reset");
        true
    }

    /// Drop the loaded window but keep the query.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let query = std::mem::take(&mut state.query);
        *state = PaginationState {
            query,
            ..PaginationState::default()
        };
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn load_next_page(&self, store: &dyn EntryStore) -> ApiResult<LoadOutcome> {
        self.load_next_page_while(store, || true).await
    }

    /// Fetch the next page from `store` unless a fetch is already running or
    /// the window is exhausted. The result is applied only if `is_current`
    /// still holds once it arrives.
    pub async fn load_next_page_while(
        &self,
        store: &dyn EntryStore,
        is_current: impl Fn() -> bool + Send,
    ) -> ApiResult<LoadOutcome> {
        let Ok(_fetching) = self.fetching.try_lock() else {
            return Ok(LoadOutcome::Busy);
        };

        let (page_index, query, epoch) = {
            let state = self.state.lock();
            if state.exhausted {
                return Ok(LoadOutcome::Exhausted);
            }
            (state.page_index, state.query.clone(), self.epoch.load(Ordering::SeqCst))
        };

        debug!(store = store.name(), page_index, query = %query, "Fetching page");
        let page = store.fetch_page(&query, page_index).await?;

        let mut state = self.state.lock();
        if !is_current() || self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(page_index, "Discarding page fetched for a previous store or query");
            return Ok(LoadOutcome::Stale);
        }

        let count = page.len();
        // A short page is the last one
        state.exhausted = count < PAGE_SIZE;
        if count > 0 {
            state.loaded.extend(page);
            state.page_index += 1;
        }
        Ok(LoadOutcome::Loaded { page_index, count })
    }

    pub async fn reload(&self, store: &dyn EntryStore, expected_count: usize) -> ApiResult<LoadOutcome> {
        self.reload_while(store, expected_count, || true).await
    }

    /// Rebuild the window from page 0 with as many pages as `expected_count`
    /// entries would span. Waits for an in-flight fetch first. The new
    /// window replaces the old one in a single step.
    pub async fn reload_while(
        &self,
        store: &dyn EntryStore,
        expected_count: usize,
        is_current: impl Fn() -> bool + Send,
    ) -> ApiResult<LoadOutcome> {
        let _fetching = self.fetching.lock().await;

        let pages = pages_for(expected_count);
        let (query, epoch) = (self.query(), self.epoch.load(Ordering::SeqCst));

        let mut loaded = Vec::with_capacity(pages * PAGE_SIZE);
        let mut fetched_pages = 0;
        let mut exhausted = false;
        for page_index in 0..pages {
            let page = store.fetch_page(&query, page_index).await?;
            exhausted = page.len() < PAGE_SIZE;
            if !page.is_empty() {
                fetched_pages += 1;
                loaded.extend(page);
            }
            if exhausted {
                break;
            }
        }

        let mut state = self.state.lock();
        if !is_current() || self.epoch.load(Ordering::SeqCst) != epoch {
            return Ok(LoadOutcome::Stale);
        }
        let count = loaded.len();
        *state = PaginationState {
            page_index: fetched_pages,
            loaded,
            exhausted,
            query,
        };
        self.epoch.fetch_add(1, Ordering::SeqCst);
        debug!(store = store.name(), pages = fetched_pages, count, "Reloaded page window");
        Ok(LoadOutcome::Reloaded {
            pages: fetched_pages,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::api::{MemoryTransport, RemoteStore};
    use crate::cache::LocalCache;
    use crate::models::ReleaseDay;

    fn catalog(n: usize) -> Vec<Entry> {
        (0..n)
            .map(|i| Entry::new(format!("Show {i:02}"), ReleaseDay::Monday, "12:00"))
            .collect()
    }

    #[tokio::test]
    async fn test_exhaustion_after_short_page() {
        let store = LocalCache::seeded(catalog(45));
        let cursor = PaginationCursor::new();

        let mut sizes = Vec::new();
        for _ in 0..3 {
            match cursor.load_next_page(&store).await.unwrap() {
                LoadOutcome::Loaded { count, .. } => sizes.push(count),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(sizes, vec![20, 20, 5]);
        assert!(cursor.is_exhausted());

        let before = cursor.state();
        assert_eq!(cursor.load_next_page(&store).await.unwrap(), LoadOutcome::Exhausted);
        assert_eq!(cursor.state(), before);
        assert_eq!(before.page_index, 3);
        assert_eq!(before.loaded.len(), 45);
    }

    #[tokio::test]
    async fn test_exhaustion_on_empty_page() {
        let store = LocalCache::seeded(catalog(40));
        let cursor = PaginationCursor::new();
        cursor.load_next_page(&store).await.unwrap();
        cursor.load_next_page(&store).await.unwrap();
        assert!(!cursor.is_exhausted());

        let outcome = cursor.load_next_page(&store).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { page_index: 2, count: 0 });
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.state().page_index, 2);
    }

    #[tokio::test]
    async fn test_query_change_resets_window() {
        let mut entries = catalog(30);
        entries.push(Entry::new("abc special", ReleaseDay::Friday, "18:00"));
        let store = LocalCache::seeded(entries);
        let cursor = PaginationCursor::new();

        cursor.load_next_page(&store).await.unwrap();
        assert_eq!(cursor.len(), 20);

        assert!(cursor.set_query("abc"));
        let state = cursor.state();
        assert_eq!(state.page_index, 0);
        assert!(state.loaded.is_empty());
        assert!(!state.exhausted);

        cursor.load_next_page(&store).await.unwrap();
        assert_eq!(cursor.loaded()[0].title, "abc special");
        assert!(cursor.is_exhausted());

        // Clearing the query is a change too
        assert!(cursor.set_query(""));
        assert!(cursor.is_empty());
        assert!(!cursor.set_query(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_loads_fetch_once() {
        let transport = Arc::new(MemoryTransport::with_entries(catalog(45)));
        transport.set_latency(Duration::from_millis(200));
        let store = RemoteStore::new(transport.clone());
        let cursor = PaginationCursor::new();

        let (first, second) = tokio::join!(cursor.load_next_page(&store), cursor.load_next_page(&store));
        assert_eq!(first.unwrap(), LoadOutcome::Loaded { page_index: 0, count: 20 });
        assert_eq!(second.unwrap(), LoadOutcome::Busy);
        assert_eq!(transport.request_count("get_page"), 1);
        assert_eq!(transport.requests()[0].data["page_index"], 0);
        assert_eq!(cursor.state().page_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_change_during_fetch_discards_result() {
        let transport = Arc::new(MemoryTransport::with_entries(catalog(5)));
        transport.set_latency(Duration::from_millis(200));
        let store = RemoteStore::new(transport);
        let cursor = PaginationCursor::new();

        let change_query = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cursor.set_query("Show 01");
        };
        let (outcome, _) = tokio::join!(cursor.load_next_page(&store), change_query);
        assert_eq!(outcome.unwrap(), LoadOutcome::Stale);
        assert!(cursor.is_empty());
        assert_eq!(cursor.query(), "Show 01");
    }

    #[tokio::test]
    async fn test_not_current_result_is_discarded() {
        let store = LocalCache::seeded(catalog(5));
        let cursor = PaginationCursor::new();
        let outcome = cursor.load_next_page_while(&store, || false).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Stale);
        assert!(cursor.is_empty());
        assert_eq!(cursor.state().page_index, 0);
    }

    #[tokio::test]
    async fn test_reload_refetches_window() {
        let store = LocalCache::seeded(catalog(45));
        let cursor = PaginationCursor::new();
        cursor.load_next_page(&store).await.unwrap();
        cursor.load_next_page(&store).await.unwrap();

        store.record(crate::models::Mutation::Delete { title: "Show 00".into() });
        let outcome = cursor.reload(&store, 39).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Reloaded { pages: 2, count: 40 });
        let state = cursor.state();
        assert_eq!(state.loaded[0].title, "Show 01");
        assert_eq!(state.page_index, 2);
        assert!(!state.exhausted);
    }

    #[tokio::test]
    async fn test_reload_zero_clears_window() {
        let store = LocalCache::seeded(catalog(3));
        let cursor = PaginationCursor::new();
        cursor.load_next_page(&store).await.unwrap();

        let outcome = cursor.reload(&store, 0).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Reloaded { pages: 0, count: 0 });
        assert_eq!(cursor.state(), PaginationState::default());
    }

    #[tokio::test]
    async fn test_reset_keeps_query() {
        let store = LocalCache::seeded(catalog(3));
        let cursor = PaginationCursor::new();
        cursor.set_query("show");
        cursor.load_next_page(&store).await.unwrap();
        cursor.reset();
        assert!(cursor.is_empty());
        assert_eq!(cursor.query(), "show");
    }
}

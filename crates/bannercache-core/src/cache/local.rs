//! In-memory entry store used while the remote service is unreachable.
//!
//! Every mutation is applied immediately. When a mutation actually changes
//! the entry set it is also appended to the change log, which is replayed
//! against the remote store once it is reachable again.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::api::ApiResult;
use crate::models::{ChangeLogEntry, Entry, Mutation, ReleaseDay};
use crate::store::{matches_query, page_window, EntryStore};

#[derive(Default)]
struct LocalState {
    entries: Vec<Entry>,
    log: VecDeque<ChangeLogEntry>,
    next_seq: u64,
}

#[derive(Default)]
pub struct LocalCache {
    state: Mutex<LocalState>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache mirroring `entries`, with an empty change log.
    pub fn seeded(entries: impl IntoIterator<Item = Entry>) -> Self {
        let cache = Self::new();
        cache.seed(entries);
        cache
    }

    /// Rebuild a cache from a persisted entry set and its pending log.
    pub fn restore(entries: Vec<Entry>, log: Vec<ChangeLogEntry>) -> Self {
        let next_seq = log.iter().map(|c| c.seq + 1).max().unwrap_or(0);
        let cache = Self::seeded(entries);
        {
            let mut state = cache.state.lock();
            state.log = log.into();
            state.next_seq = next_seq;
        }
        cache
    }

    /// Bulk-load entries without recording them in the change log.
    /// Titles already present are skipped. Returns the number loaded.
    pub fn seed(&self, entries: impl IntoIterator<Item = Entry>) -> usize {
        let mut state = self.state.lock();
        entries
            .into_iter()
            .filter(|entry| Mutation::Add(entry.clone()).apply_to(&mut state.entries))
            .count()
    }

    /// Apply a mutation and log it if the entry set changed.
    /// Returns whether anything changed.
    pub fn record(&self, mutation: Mutation) -> bool {
        let mut state = self.state.lock();
        if !mutation.apply_to(&mut state.entries) {
            debug!(method = %mutation.kind(), title = mutation.title(), "Local mutation changed nothing");
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(seq, method = %mutation.kind(), title = mutation.title(), "Recorded local change");
        state.log.push_back(ChangeLogEntry::new(seq, mutation));
        true
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.state.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.state.lock().entries.iter().any(|e| e.title == title)
    }

    /// The pending change log, oldest first.
    pub fn change_log(&self) -> Vec<ChangeLogEntry> {
        self.state.lock().log.iter().cloned().collect()
    }

    pub fn pending_changes(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Oldest change not yet acknowledged, left in place.
    pub fn next_change(&self) -> Option<ChangeLogEntry> {
        self.state.lock().log.front().cloned()
    }

    /// Remove the oldest change once it has been dealt with. Only removes it
    /// if it is still the change numbered `seq`.
    pub fn acknowledge(&self, seq: u64) -> bool {
        let mut state = self.state.lock();
        if state.log.front().map(|c| c.seq) == Some(seq) {
            state.log.pop_front();
            true
        } else {
            false
        }
    }

    pub fn page(&self, page_index: usize) -> Vec<Entry> {
        page_window(&self.state.lock().entries, page_index)
    }

    pub fn search_page(&self, query: &str, page_index: usize) -> Vec<Entry> {
        let state = self.state.lock();
        page_window(state.entries.iter().filter(|e| matches_query(e, query)), page_index)
    }
}

#[async_trait]
impl EntryStore for LocalCache {
    fn name(&self) -> &'static str {
        "local"
    }

    /// Adding a title that already exists is a silent no-op offline.
    async fn add(&self, entry: Entry) -> ApiResult<()> {
        self.record(Mutation::Add(entry));
        Ok(())
    }

    async fn delete(&self, title: &str) -> ApiResult<()> {
        self.record(Mutation::Delete {
            title: title.to_string(),
        });
        Ok(())
    }

    async fn get_page(&self, page_index: usize) -> ApiResult<Vec<Entry>> {
        Ok(self.page(page_index))
    }

    async fn search(&self, query: &str, page_index: usize) -> ApiResult<Vec<Entry>> {
        Ok(self.search_page(query, page_index))
    }

    async fn update_current_episodes(&self, title: &str, current_episodes: u32) -> ApiResult<()> {
        self.record(Mutation::UpdateCurrentEpisodes {
            title: title.to_string(),
            current_episodes,
        });
        Ok(())
    }

    async fn update_total_episodes(&self, title: &str, total_episodes: u32) -> ApiResult<()> {
        self.record(Mutation::UpdateTotalEpisodes {
            title: title.to_string(),
            total_episodes,
        });
        Ok(())
    }

    async fn update_release_day(&self, title: &str, release_day: ReleaseDay) -> ApiResult<()> {
        self.record(Mutation::UpdateReleaseDay {
            title: title.to_string(),
            release_day,
        });
        Ok(())
    }

    async fn update_release_time(&self, title: &str, release_time: &str) -> ApiResult<()> {
        self.record(Mutation::UpdateReleaseTime {
            title: title.to_string(),
            release_time: release_time.to_string(),
        });
        Ok(())
    }
}

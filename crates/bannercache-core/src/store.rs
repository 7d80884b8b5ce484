//! The capability set shared by every entry store.
//!
//! Both the remote store and the local cache implement [`EntryStore`], and
//! both page through results with the same [`PAGE_SIZE`] and the same search
//! matching rules ([`matches_query`], [`page_window`]).

use async_trait::async_trait;

use crate::api::ApiResult;
use crate::models::{Entry, Mutation, ReleaseDay};
use crate::utils::contains_ignore_case;

/// Number of entries per page, for every paged or search call on every store.
pub const PAGE_SIZE: usize = 20;

/// Number of pages needed to hold `count` entries.
pub fn pages_for(count: usize) -> usize {
    count.div_ceil(PAGE_SIZE)
}

/// Search predicate: case-insensitive substring match over the title.
pub fn matches_query(entry: &Entry, query: &str) -> bool {
    contains_ignore_case(&entry.title, query)
}

/// Slice one page out of an ordered result set.
pub fn page_window<'a, I>(entries: I, page_index: usize) -> Vec<Entry>
where
    I: IntoIterator<Item = &'a Entry>,
{
    entries
        .into_iter()
        .skip(page_index.saturating_mul(PAGE_SIZE))
        .take(PAGE_SIZE)
        .cloned()
        .collect()
}

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Short name for logs ("remote", "local").
    fn name(&self) -> &'static str;

    async fn add(&self, entry: Entry) -> ApiResult<()>;

    async fn delete(&self, title: &str) -> ApiResult<()>;

    async fn get_page(&self, page_index: usize) -> ApiResult<Vec<Entry>>;

    async fn search(&self, query: &str, page_index: usize) -> ApiResult<Vec<Entry>>;

    async fn update_current_episodes(&self, title: &str, current_episodes: u32) -> ApiResult<()>;

    async fn update_total_episodes(&self, title: &str, total_episodes: u32) -> ApiResult<()>;

    async fn update_release_day(&self, title: &str, release_day: ReleaseDay) -> ApiResult<()>;

    async fn update_release_time(&self, title: &str, release_time: &str) -> ApiResult<()>;

    /// Dispatch a mutation value to the matching operation.
    async fn apply(&self, mutation: Mutation) -> ApiResult<()> {
        match mutation {
            Mutation::Add(entry) => self.add(entry).await,
            Mutation::Delete { title } => self.delete(&title).await,
            Mutation::UpdateCurrentEpisodes { title, current_episodes } => {
                self.update_current_episodes(&title, current_episodes).await
            }
            Mutation::UpdateTotalEpisodes { title, total_episodes } => {
                self.update_total_episodes(&title, total_episodes).await
            }
            Mutation::UpdateReleaseDay { title, release_day } => {
                self.update_release_day(&title, release_day).await
            }
            Mutation::UpdateReleaseTime { title, release_time } => {
                self.update_release_time(&title, &release_time).await
            }
        }
    }

    /// Fetch one page, through `search` when a query is set.
    async fn fetch_page(&self, query: &str, page_index: usize) -> ApiResult<Vec<Entry>> {
        if query.is_empty() {
            self.get_page(page_index).await
        } else {
            self.search(query, page_index).await
        }
    }
}

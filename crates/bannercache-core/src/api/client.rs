//! Remote store client.
//!
//! [`RemoteStore`] turns each catalog operation into one [`RemoteRequest`]
//! round trip over a [`Transport`]. It holds no entry state of its own.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::transport::{RemoteRequest, Transport};
use super::{ApiError, ApiResult};
use crate::models::{Entry, LoginOutcome, Mutation, ReleaseDay};
use crate::store::EntryStore;

/// Clone is cheap - the transport is shared.
#[derive(Clone)]
pub struct RemoteStore {
    transport: Arc<dyn Transport>,
}

impl RemoteStore {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, request: RemoteRequest) -> ApiResult<T> {
        let method = request.method.clone();
        let value = self.transport.call(request).await?;
        serde_json::from_value(value).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse {} response: {}", method, e))
        })
    }

    /// Send a mutation; the response body is ignored.
    async fn send(&self, mutation: &Mutation) -> ApiResult<()> {
        let request = RemoteRequest::from_mutation(mutation)?;
        debug!(method = %request.method, title = mutation.title(), "Remote mutation");
        self.transport.call(request).await.map(|_: Value| ())
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<LoginOutcome> {
        self.call(RemoteRequest::login(username, password)).await
    }

    /// Returns whether the account was created.
    pub async fn register(&self, username: &str, password: &str, is_admin: bool) -> ApiResult<bool> {
        self.call(RemoteRequest::register(username, password, is_admin)).await
    }
}

#[async_trait]
impl EntryStore for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn add(&self, entry: Entry) -> ApiResult<()> {
        let title = entry.title.clone();
        match self.send(&Mutation::Add(entry)).await {
            Err(ApiError::Conflict(_)) => Err(ApiError::DuplicateTitle(title)),
            other => other,
        }
    }

    async fn delete(&self, title: &str) -> ApiResult<()> {
        self.send(&Mutation::Delete {
            title: title.to_string(),
        })
        .await
    }

    async fn get_page(&self, page_index: usize) -> ApiResult<Vec<Entry>> {
        self.call(RemoteRequest::get_page(page_index)).await
    }

    async fn search(&self, query: &str, page_index: usize) -> ApiResult<Vec<Entry>> {
        self.call(RemoteRequest::search(query, page_index)).await
    }

    async fn update_current_episodes(&self, title: &str, current_episodes: u32) -> ApiResult<()> {
        self.send(&Mutation::UpdateCurrentEpisodes {
            title: title.to_string(),
            current_episodes,
        })
        .await
    }

    async fn update_total_episodes(&self, title: &str, total_episodes: u32) -> ApiResult<()> {
        self.send(&Mutation::UpdateTotalEpisodes {
            title: title.to_string(),
            total_episodes,
        })
        .await
    }

    async fn update_release_day(&self, title: &str, release_day: ReleaseDay) -> ApiResult<()> {
        self.send(&Mutation::UpdateReleaseDay {
            title: title.to_string(),
            release_day,
        })
        .await
    }

    async fn update_release_time(&self, title: &str, release_time: &str) -> ApiResult<()> {
        self.send(&Mutation::UpdateReleaseTime {
            title: title.to_string(),
            release_time: release_time.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryTransport;
    use crate::store::PAGE_SIZE;

    fn store() -> (Arc<MemoryTransport>, RemoteStore) {
        let transport = Arc::new(MemoryTransport::new());
        let store = RemoteStore::new(transport.clone());
        (transport, store)
    }

    fn entry(title: &str) -> Entry {
        Entry::new(title, ReleaseDay::Tuesday, "21:00").with_episodes(3, 13)
    }

    #[tokio::test]
    async fn test_duplicate_add_is_rejected() {
        let (transport, store) = store();
        store.add(entry("Vinland Saga")).await.unwrap();

        let err = store.add(entry("Vinland Saga")).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateTitle(ref t) if t == "Vinland Saga"));
        assert_eq!(transport.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_paging_and_search() {
        let (transport, store) = store();
        for i in 0..25 {
            transport.insert(entry(&format!("Show {i:02}")));
        }
        transport.insert(entry("Haikyuu"));

        assert_eq!(store.get_page(0).await.unwrap().len(), PAGE_SIZE);
        assert_eq!(store.get_page(1).await.unwrap().len(), 6);
        assert!(store.get_page(2).await.unwrap().is_empty());

        let found = store.search("HAIK", 0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Haikyuu");
        assert!(store.search("haik", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_updates_and_delete() {
        let (transport, store) = store();
        store.add(entry("Mob Psycho")).await.unwrap();
        store.update_current_episodes("Mob Psycho", 7).await.unwrap();
        store.update_total_episodes("Mob Psycho", 12).await.unwrap();
        store.update_release_day("Mob Psycho", ReleaseDay::Sunday).await.unwrap();
        store.update_release_time("Mob Psycho", "08:45").await.unwrap();

        let stored = transport.entries().remove(0);
        assert_eq!(stored.current_episodes, 7);
        assert_eq!(stored.total_episodes, 12);
        assert_eq!(stored.release_day, ReleaseDay::Sunday);
        assert_eq!(stored.release_time, "08:45");

        store.delete("Mob Psycho").await.unwrap();
        assert!(transport.entries().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_transport_fails_calls() {
        let (transport, store) = store();
        transport.set_reachable(false);
        let err = store.get_page(0).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_login_and_register() {
        let (_transport, store) = store();
        assert!(store.register("kaori", "pw", true).await.unwrap());
        assert!(!store.register("kaori", "other", false).await.unwrap());

        assert_eq!(store.login("kaori", "pw").await.unwrap(), LoginOutcome::Admin);
        assert!(!store.login("kaori", "nope").await.unwrap().is_success());
        assert!(!store.login("nobody", "pw").await.unwrap().is_success());
    }
}

//! Online/offline switching between the remote store and the local cache.
//!
//! The coordinator owns the single active store and the pagination cursor.
//! Reachability readings drive two transitions:
//!
//! - going offline: a fresh `LocalCache` is seeded with the entries currently
//!   loaded and becomes the active store
//! - coming online: the cache's change log is replayed against a fresh
//!   `RemoteStore`, which becomes the active store once the log is drained
//!
//! Readings that match the current state do nothing, so the coordinator can
//! be fed the same reading over and over.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::cursor::{LoadOutcome, PaginationCursor, PaginationState};
use super::error::{SyncError, SyncResult};
use super::replay::{replay, ReplayPolicy, ReplayReport};
use crate::api::{ApiResult, RemoteStore, Transport};
use crate::cache::{CacheManager, LocalCache};
use crate::models::{parse_release_time, Entry, LoginOutcome, ReleaseDay};
use crate::store::EntryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The remote store is active.
    Online,
    /// The local cache is active and recording changes.
    Offline,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Online => write!(f, "online"),
            ConnectionState::Offline => write!(f, "offline"),
        }
    }
}

/// The store currently serving reads and writes.
#[derive(Clone)]
pub enum ActiveStore {
    Remote(RemoteStore),
    Local(Arc<LocalCache>),
}

impl ActiveStore {
    pub fn state(&self) -> ConnectionState {
        match self {
            ActiveStore::Remote(_) => ConnectionState::Online,
            ActiveStore::Local(_) => ConnectionState::Offline,
        }
    }

    fn as_store(&self) -> &dyn EntryStore {
        match self {
            ActiveStore::Remote(remote) => remote,
            ActiveStore::Local(cache) => cache.as_ref(),
        }
    }
}

#[async_trait]
impl EntryStore for ActiveStore {
    fn name(&self) -> &'static str {
        self.as_store().name()
    }

    async fn add(&self, entry: Entry) -> ApiResult<()> {
        self.as_store().add(entry).await
    }

    async fn delete(&self, title: &str) -> ApiResult<()> {
        self.as_store().delete(title).await
    }

    async fn get_page(&self, page_index: usize) -> ApiResult<Vec<Entry>> {
        self.as_store().get_page(page_index).await
    }

    async fn search(&self, query: &str, page_index: usize) -> ApiResult<Vec<Entry>> {
        self.as_store().search(query, page_index).await
    }

    async fn update_current_episodes(&self, title: &str, current_episodes: u32) -> ApiResult<()> {
        self.as_store().update_current_episodes(title, current_episodes).await
    }

    async fn update_total_episodes(&self, title: &str, total_episodes: u32) -> ApiResult<()> {
        self.as_store().update_total_episodes(title, total_episodes).await
    }

    async fn update_release_day(&self, title: &str, release_day: ReleaseDay) -> ApiResult<()> {
        self.as_store().update_release_day(title, release_day).await
    }

    async fn update_release_time(&self, title: &str, release_time: &str) -> ApiResult<()> {
        self.as_store().update_release_time(title, release_time).await
    }
}

#[derive(Debug, Clone)]
pub enum Transition {
    /// Already on the right store.
    None,
    /// Switched to a local cache seeded with `seeded` entries.
    WentOffline { seeded: usize },
    /// Change log drained and the remote store is active again.
    WentOnline(ReplayReport),
    /// The drain stopped early; still offline, the rest of the log is kept.
    ReplayIncomplete(ReplayReport),
}

pub struct SyncCoordinator {
    transport: Arc<dyn Transport>,
    active: RwLock<ActiveStore>,
    /// Bumped on every store swap.
    generation: AtomicU64,
    cursor: PaginationCursor,
    replay_policy: ReplayPolicy,
    persistence: Option<CacheManager>,
    /// Serializes transitions.
    switching: tokio::sync::Mutex<()>,
}

impl SyncCoordinator {
    /// Start on the remote store if `reachable`, otherwise on an empty
    /// local cache.
    pub fn new(transport: Arc<dyn Transport>, reachable: bool) -> Self {
        let active = if reachable {
            ActiveStore::Remote(RemoteStore::new(transport.clone()))
        } else {
            ActiveStore::Local(Arc::new(LocalCache::new()))
        };
        info!(state = %active.state(), "Sync coordinator started");
        Self {
            transport,
            active: RwLock::new(active),
            generation: AtomicU64::new(0),
            cursor: PaginationCursor::new(),
            replay_policy: ReplayPolicy::default(),
            persistence: None,
            switching: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_replay_policy(mut self, policy: ReplayPolicy) -> Self {
        self.replay_policy = policy;
        self
    }

    /// Keep offline sessions on disk so they survive a restart.
    pub fn with_cache_manager(mut self, manager: CacheManager) -> Self {
        self.persistence = Some(manager);
        self
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn state(&self) -> ConnectionState {
        self.active.read().state()
    }

    pub fn is_online(&self) -> bool {
        self.state() == ConnectionState::Online
    }

    pub fn active_store(&self) -> ActiveStore {
        self.active.read().clone()
    }

    fn snapshot(&self) -> (ActiveStore, u64) {
        let active = self.active.read();
        (active.clone(), self.generation.load(Ordering::SeqCst))
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn swap(&self, store: ActiveStore) {
        let mut active = self.active.write();
        *active = store;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn local_cache(&self) -> Option<Arc<LocalCache>> {
        match &*self.active.read() {
            ActiveStore::Local(cache) => Some(cache.clone()),
            ActiveStore::Remote(_) => None,
        }
    }

    /// Changes recorded offline and not yet replayed.
    pub fn pending_changes(&self) -> usize {
        self.local_cache().map(|c| c.pending_changes()).unwrap_or(0)
    }

    pub fn replay_policy(&self) -> ReplayPolicy {
        self.replay_policy
    }

    pub fn cache_manager(&self) -> Option<&CacheManager> {
        self.persistence.as_ref()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Bring the active store in line with a reachability reading.
    pub async fn apply_reachability(&self, reachable: bool) -> Transition {
        let _switching = self.switching.lock().await;
        match (self.state(), reachable) {
            (ConnectionState::Online, true) | (ConnectionState::Offline, false) => Transition::None,
            (ConnectionState::Online, false) => self.go_offline(),
            (ConnectionState::Offline, true) => match self.local_cache() {
                Some(cache) => self.go_online(cache).await,
                None => Transition::None,
            },
        }
    }

    fn go_offline(&self) -> Transition {
        let cache = Arc::new(LocalCache::seeded(self.cursor.loaded()));
        let seeded = cache.len();
        self.swap(ActiveStore::Local(cache.clone()));
        self.persist(&cache);
        info!(seeded, "Remote unreachable, switched to local cache");
        Transition::WentOffline { seeded }
    }

    async fn go_online(&self, cache: Arc<LocalCache>) -> Transition {
        let remote = RemoteStore::new(self.transport.clone());
        let mut report = replay(&cache, &remote, self.replay_policy).await;
        if !report.is_complete() {
            self.persist(&cache);
            warn!(remaining = report.remaining, "Still offline, change log not fully replayed");
            return Transition::ReplayIncomplete(report);
        }

        let window = self.cursor.len();
        self.swap(ActiveStore::Remote(remote.clone()));

        self.drain_late_changes(&cache, &remote, &mut report).await;
        info!(replayed = report.replayed, skipped = report.skipped.len(), "Remote reachable, switched to remote store");

        if let Err(e) = self.reload(window).await {
            warn!(error = %e, "Failed to reload page window after reconnect");
        }
        Transition::WentOnline(report)
    }

    /// Replay changes that reached the old cache after its first drain, from
    /// a mutation that picked the cache just before the swap. Whatever still
    /// fails stays on disk for the next session.
    async fn drain_late_changes(&self, cache: &LocalCache, remote: &RemoteStore, report: &mut ReplayReport) {
        if cache.pending_changes() > 0 {
            report.merge(replay(cache, remote, self.replay_policy).await);
        }
        if report.is_complete() {
            self.clear_persisted();
        } else {
            warn!(remaining = report.remaining, "Changes recorded during reconnect were not replayed");
            self.persist(cache);
        }
    }

    /// Pick up an offline session saved by a previous run.
    ///
    /// Offline, the restored cache becomes the active store. Online, its log
    /// is replayed first; if that stops early the coordinator stays offline.
    pub async fn resume_offline_session(&self) -> Transition {
        let Some(manager) = &self.persistence else {
            return Transition::None;
        };
        let cache = match manager.load_offline() {
            Ok(Some(cache)) => Arc::new(cache),
            Ok(None) => return Transition::None,
            Err(e) => {
                warn!(error = %e, "Failed to load saved offline session");
                return Transition::None;
            }
        };
        info!(entries = cache.len(), pending = cache.pending_changes(), "Restored offline session");

        let _switching = self.switching.lock().await;
        let reachable = self.is_online();
        self.swap(ActiveStore::Local(cache.clone()));
        self.cursor.reset();
        if reachable {
            self.go_online(cache).await
        } else {
            Transition::WentOffline { seeded: cache.len() }
        }
    }

    /// Follow a reachability signal until its sender goes away.
    ///
    /// The current reading is re-applied at least every `tick`, so a drain
    /// that stopped early is retried while the remote stays reachable.
    pub async fn run(&self, mut reachability: watch::Receiver<bool>, tick: Duration) {
        loop {
            let reachable = *reachability.borrow_and_update();
            match self.apply_reachability(reachable).await {
                Transition::None => {}
                transition => debug!(?transition, "Store transition"),
            }
            tokio::select! {
                changed = reachability.changed() => {
                    if changed.is_err() {
                        debug!("Reachability signal closed, stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }

    fn persist(&self, cache: &LocalCache) {
        if let Some(manager) = &self.persistence {
            if let Err(e) = manager.save_offline(cache) {
                warn!(error = %e, "Failed to save offline session");
            }
        }
    }

    fn clear_persisted(&self) {
        if let Some(manager) = &self.persistence {
            if let Err(e) = manager.clear_offline() {
                warn!(error = %e, "Failed to clear saved offline session");
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn pagination(&self) -> PaginationState {
        self.cursor.state()
    }

    /// Entries in the current page window.
    pub fn entries(&self) -> Vec<Entry> {
        self.cursor.loaded()
    }

    pub fn set_query(&self, query: &str) -> bool {
        self.cursor.set_query(query)
    }

    /// Fetch the next page from whichever store is active. A result that
    /// arrives after a store swap is discarded.
    pub async fn load_next_page(&self) -> ApiResult<LoadOutcome> {
        let (store, generation) = self.snapshot();
        self.cursor
            .load_next_page_while(&store, || self.generation() == generation)
            .await
    }

    /// Rebuild the page window so it spans `expected_count` entries.
    pub async fn reload(&self, expected_count: usize) -> ApiResult<LoadOutcome> {
        let (store, generation) = self.snapshot();
        self.cursor
            .reload_while(&store, expected_count, || self.generation() == generation)
            .await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn add(&self, entry: Entry) -> SyncResult<()> {
        validate_release_time(&entry.release_time)?;
        let store = self.active_store();
        store.add(entry).await?;
        self.after_mutation(&store, self.cursor.len() + 1).await;
        Ok(())
    }

    pub async fn delete(&self, title: &str) -> SyncResult<()> {
        let store = self.active_store();
        store.delete(title).await?;
        self.after_mutation(&store, self.cursor.len().saturating_sub(1)).await;
        Ok(())
    }

    pub async fn update_current_episodes(&self, title: &str, current_episodes: u32) -> SyncResult<()> {
        let store = self.active_store();
        store.update_current_episodes(title, current_episodes).await?;
        self.after_mutation(&store, self.cursor.len()).await;
        Ok(())
    }

    pub async fn update_total_episodes(&self, title: &str, total_episodes: u32) -> SyncResult<()> {
        let store = self.active_store();
        store.update_total_episodes(title, total_episodes).await?;
        self.after_mutation(&store, self.cursor.len()).await;
        Ok(())
    }

    pub async fn update_release_day(&self, title: &str, release_day: ReleaseDay) -> SyncResult<()> {
        let store = self.active_store();
        store.update_release_day(title, release_day).await?;
        self.after_mutation(&store, self.cursor.len()).await;
        Ok(())
    }

    pub async fn update_release_time(&self, title: &str, release_time: &str) -> SyncResult<()> {
        validate_release_time(release_time)?;
        let store = self.active_store();
        store.update_release_time(title, release_time).await?;
        self.after_mutation(&store, self.cursor.len()).await;
        Ok(())
    }

    /// Save offline work and re-derive the visible window.
    async fn after_mutation(&self, store: &ActiveStore, expected_count: usize) {
        if let ActiveStore::Local(cache) = store {
            self.persist(cache);
        }
        if let Err(e) = self.reload(expected_count).await {
            warn!(error = %e, "Failed to reload page window after mutation");
        }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<LoginOutcome> {
        match self.active_store() {
            ActiveStore::Remote(remote) => remote.login(username, password).await,
            ActiveStore::Local(_) => Ok(LoginOutcome::fail("Remote service unreachable")),
        }
    }

    pub async fn register(&self, username: &str, password: &str, is_admin: bool) -> ApiResult<bool> {
        match self.active_store() {
            ActiveStore::Remote(remote) => remote.register(username, password, is_admin).await,
            ActiveStore::Local(_) => Ok(false),
        }
    }
}

fn validate_release_time(release_time: &str) -> SyncResult<()> {
    match parse_release_time(release_time) {
        Some(_) => Ok(()),
        None => Err(SyncError::InvalidReleaseTime(release_time.to_string())),
    }
}

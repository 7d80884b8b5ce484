use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::LocalCache;
use crate::models::{ChangeLogEntry, Entry};

/// An offline snapshot older than this may be missing remote changes.
const STALE_AFTER_MINUTES: i64 = 60;

const ENTRIES_FILE: &str = "entries";
const CHANGES_FILE: &str = "changes";

/// A cached value stamped with when it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    /// Never negative, even if the clock moved backwards.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.cached_at).max(Duration::zero())
    }

    pub fn age_display(&self) -> String {
        format_age(self.age())
    }

    pub fn is_stale(&self) -> bool {
        self.age() > Duration::minutes(STALE_AFTER_MINUTES)
    }
}

/// Rounded to the nearest unit: "just now", "5m ago", "2h ago", "3d ago".
fn format_age(age: Duration) -> String {
    const HOUR: i64 = 60;
    const DAY: i64 = 24 * HOUR;
    match age.num_minutes() {
        m if m < 1 => "just now".to_string(),
        m if m < HOUR => format!("{}m ago", m),
        m if m < DAY => format!("{}h ago", (m + HOUR / 2) / HOUR),
        m => format!("{}d ago", (m + DAY / 2) / DAY),
    }
}

/// On-disk copy of an offline session: the entry set and the pending
/// change log, so offline work survives a restart.
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let path = self.cache_path(name);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.cache_path(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove cache file: {}", name))?;
        }
        Ok(())
    }

    // ===== Entries =====

    pub fn load_entries(&self) -> Result<Option<CachedData<Vec<Entry>>>> {
        self.load(ENTRIES_FILE)
    }

    pub fn save_entries(&self, entries: &[Entry]) -> Result<()> {
        self.save(ENTRIES_FILE, &entries)
    }

    // ===== Pending changes =====

    pub fn load_changes(&self) -> Result<Option<CachedData<Vec<ChangeLogEntry>>>> {
        self.load(CHANGES_FILE)
    }

    pub fn save_changes(&self, changes: &[ChangeLogEntry]) -> Result<()> {
        self.save(CHANGES_FILE, &changes)
    }

    // ===== Offline session =====

    /// Persist the cache's entry set and change log.
    pub fn save_offline(&self, cache: &LocalCache) -> Result<()> {
        self.save_entries(&cache.entries())?;
        self.save_changes(&cache.change_log())?;
        debug!(pending = cache.pending_changes(), "Saved offline session");
        Ok(())
    }

    /// Rebuild a cache from disk, if an offline session was saved.
    pub fn load_offline(&self) -> Result<Option<LocalCache>> {
        let Some(entries) = self.load_entries()? else {
            return Ok(None);
        };
        let changes = self.load_changes()?.map(|c| c.data).unwrap_or_default();
        Ok(Some(LocalCache::restore(entries.data, changes)))
    }

    /// Forget the saved offline session.
    pub fn clear_offline(&self) -> Result<()> {
        self.remove(CHANGES_FILE)?;
        self.remove(ENTRIES_FILE)
    }

    /// The saved offline entry set, for display. Read errors count as absent.
    pub fn offline_snapshot(&self) -> Option<CachedData<Vec<Entry>>> {
        self.load_entries().unwrap_or_else(|e| {
            debug!(error = %e, "Failed to read offline snapshot");
            None
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Offline side of the catalog.
//!
//! - `LocalCache`: the in-memory store used while the remote service is
//!   unreachable, with its ordered change log
//! - `CacheManager`: JSON files that keep an offline session (entries and
//!   pending changes) across restarts

pub mod local;
pub mod manager;

pub use local::LocalCache;
pub use manager::{CacheManager, CachedData};

//! Core library for bannercache.
//!
//! A client-side data layer for a paginated catalog of banners. Reads and
//! writes go to the remote service while it is reachable and to an
//! in-memory cache while it is not; changes made offline are replayed, in
//! order, once the service comes back.

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod store;
pub mod sync;
pub mod utils;

pub use api::{ApiError, ApiResult, HttpTransport, MemoryTransport, RemoteStore};
pub use cache::{CacheManager, LocalCache};
pub use config::Config;
pub use models::{ChangeLogEntry, Entry, LoginOutcome, Mutation, ReleaseDay};
pub use store::{EntryStore, PAGE_SIZE};
pub use sync::{ConnectionState, ConnectivityMonitor, ReplayPolicy, SyncCoordinator, Transition};

//! Keeping the catalog usable while the remote service comes and goes.
//!
//! - `ConnectivityMonitor`: polls a reachability probe and publishes changes
//! - `PaginationCursor`: the incrementally loaded page window
//! - `replay`: drains the offline change log into the remote store
//! - `SyncCoordinator`: switches the active store on reachability changes

pub mod coordinator;
pub mod cursor;
pub mod error;
pub mod monitor;
pub mod replay;

pub use coordinator::{ActiveStore, ConnectionState, SyncCoordinator, Transition};
pub use cursor::{LoadOutcome, PaginationCursor, PaginationState};
pub use error::{SyncError, SyncResult};
pub use monitor::{check, ConnectivityMonitor};
pub use replay::{replay, ReplayFailure, ReplayPolicy, ReplayReport};

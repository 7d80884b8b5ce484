//! Data models for the banner catalog.
//!
//! - `Entry`, `ReleaseDay`: a tracked banner and its weekly schedule
//! - `Mutation`, `ChangeLogEntry`: changes to the catalog, live or recorded
//! - `LoginOutcome`: the role returned by the remote login call

pub mod account;
pub mod entry;
pub mod mutation;

pub use account::LoginOutcome;
pub use entry::{parse_release_time, sort_by_schedule, Entry, ReleaseDay, RELEASE_TIME_FORMAT};
pub use mutation::{ChangeLogEntry, Mutation, OperationKind};

//! Remote service access.
//!
//! This module provides the `RemoteStore` for talking to the banner
//! service through an opaque request/response `Transport`. Every call is a
//! single round trip carrying a `{method, data}` request.
//!
//! Two transports are provided: `HttpTransport` (JSON over HTTP) and
//! `MemoryTransport` (an in-process service used by tests and demos).

pub mod client;
pub mod error;
pub mod memory;
pub mod transport;

pub use client::RemoteStore;
pub use error::{ApiError, ApiResult};
pub use memory::MemoryTransport;
pub use transport::{FnProbe, HttpTransport, ReachabilityProbe, RemoteRequest, Transport};

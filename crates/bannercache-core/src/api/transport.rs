//! The request/response channel to the remote service.
//!
//! The remote store only needs something that can carry a
//! [`RemoteRequest`] and hand back a JSON value. [`HttpTransport`] does that
//! over HTTP with reqwest; tests and offline demos use
//! [`MemoryTransport`](super::memory::MemoryTransport).

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ApiError, ApiResult};
use crate::models::Mutation;
use crate::store::PAGE_SIZE;

/// HTTP request timeout in seconds, unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// One remote call: a method name and its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub method: String,
    #[serde(default)]
    pub data: Value,
}

impl RemoteRequest {
    pub fn new(method: impl Into<String>, data: Value) -> Self {
        Self {
            method: method.into(),
            data,
        }
    }

    /// Build the live request for a mutation. Goes through the mutation's own
    /// serialization so recorded and live calls share one shape.
    pub fn from_mutation(mutation: &Mutation) -> ApiResult<Self> {
        Ok(serde_json::from_value(serde_json::to_value(mutation)?)?)
    }

    pub fn get_page(page_index: usize) -> Self {
        Self::new(
            "get_page",
            json!({ "page_index": page_index, "page_size": PAGE_SIZE }),
        )
    }

    pub fn search(query: &str, page_index: usize) -> Self {
        Self::new(
            "search",
            json!({ "query": query, "page_index": page_index, "page_size": PAGE_SIZE }),
        )
    }

    pub fn login(username: &str, password: &str) -> Self {
        Self::new("login", json!({ "username": username, "password": password }))
    }

    pub fn register(username: &str, password: &str, is_admin: bool) -> Self {
        Self::new(
            "register",
            json!({ "username": username, "password": password, "is_admin": is_admin }),
        )
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one round trip.
    async fn call(&self, request: RemoteRequest) -> ApiResult<Value>;
}

/// The external "is the remote reachable" check.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> ApiResult<bool>;
}

/// Adapts a closure into a [`ReachabilityProbe`].
pub struct FnProbe<F>(pub F);

#[async_trait]
impl<F> ReachabilityProbe for FnProbe<F>
where
    F: Fn() -> BoxFuture<'static, bool> + Send + Sync,
{
    async fn probe(&self) -> ApiResult<bool> {
        Ok((self.0)().await)
    }
}

/// JSON-over-HTTP transport.
///
/// Every call is a `POST {base_url}/rpc` with the request as body; the
/// reachability probe is a `GET {base_url}/ping`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: reqwest::Response) -> ApiResult<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: RemoteRequest) -> ApiResult<Value> {
        let url = format!("{}/rpc", self.base_url);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            debug!(method = %request.method, "Sending remote request");
            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    if text.trim().is_empty() {
                        return Ok(Value::Null);
                    }
                    return Ok(serde_json::from_str(&text)?);
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(method = %request.method, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpTransport {
    async fn probe(&self) -> ApiResult<bool> {
        let url = format!("{}/ping", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, ReleaseDay};
    use futures::FutureExt;

    #[test]
    fn test_request_from_mutation_keeps_shape() {
        let mutation = Mutation::UpdateReleaseDay {
            title: "Oshi no Ko".to_string(),
            release_day: ReleaseDay::Wednesday,
        };
        let request = RemoteRequest::from_mutation(&mutation).unwrap();
        assert_eq!(request.method, "update_release_day");
        assert_eq!(request.data, json!({"title": "Oshi no Ko", "release_day": "Wednesday"}));
        assert_eq!(serde_json::to_value(&request).unwrap(), serde_json::to_value(&mutation).unwrap());
    }

    #[test]
    fn test_add_request_round_trips_entry() {
        let entry = Entry::new("Blue Lock", ReleaseDay::Saturday, "17:30").with_episodes(0, 0);
        let request = RemoteRequest::from_mutation(&Mutation::Add(entry.clone())).unwrap();
        let back: Entry = serde_json::from_value(request.data).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_page_requests_carry_page_size() {
        let request = RemoteRequest::search("abc", 2);
        assert_eq!(request.method, "search");
        assert_eq!(request.data["page_size"], PAGE_SIZE);
        assert_eq!(request.data["page_index"], 2);
        assert_eq!(RemoteRequest::get_page(0).data["page_size"], PAGE_SIZE);
    }

    #[test]
    fn test_http_transport_trims_base_url() {
        let transport = HttpTransport::new("http://localhost:8080/").unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_fn_probe() {
        let up = FnProbe(|| async { true }.boxed());
        assert!(up.probe().await.unwrap());
        let down = FnProbe(|| async { false }.boxed());
        assert!(!down.probe().await.unwrap());
    }
}

//! In-process stand-in for the remote service.
//!
//! Speaks the same request vocabulary as the real service and enforces the
//! same rules (duplicate titles rejected, shared page size and search
//! matching). Reachability, latency and failures can be toggled, which makes
//! it the transport of choice for tests and for running the CLI without a
//! server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::transport::{ReachabilityProbe, RemoteRequest, Transport};
use super::{ApiError, ApiResult};
use crate::models::{Entry, LoginOutcome, Mutation};
use crate::store::{matches_query, page_window};

#[derive(Deserialize)]
struct PageParams {
    page_index: usize,
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    page_index: usize,
}

#[derive(Deserialize)]
struct LoginParams {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RegisterParams {
    username: String,
    password: String,
    #[serde(default)]
    is_admin: bool,
}

struct Account {
    password: String,
    is_admin: bool,
}

#[derive(Default)]
struct ServiceState {
    entries: Vec<Entry>,
    accounts: HashMap<String, Account>,
}

pub struct MemoryTransport {
    state: Mutex<ServiceState>,
    reachable: AtomicBool,
    latency: Mutex<Duration>,
    failing_method: Mutex<Option<String>>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::default()),
            reachable: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
            failing_method: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let transport = Self::new();
        for entry in entries {
            transport.insert(entry);
        }
        transport
    }

    /// Insert directly on the service side, bypassing the request log.
    /// Returns false if the title is taken.
    pub fn insert(&self, entry: Entry) -> bool {
        Mutation::Add(entry).apply_to(&mut self.state.lock().entries)
    }

    /// Snapshot of the service-side entry set, in insertion order.
    pub fn entries(&self) -> Vec<Entry> {
        self.state.lock().entries.clone()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Delay every call by `latency` before it is served.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Make every call to `method` fail with a server error; `None` clears it.
    pub fn fail_method(&self, method: Option<&str>) {
        *self.failing_method.lock() = method.map(str::to_string);
    }

    /// Every request that reached the service, in arrival order.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, method: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.method == method).count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn serve(&self, request: RemoteRequest) -> ApiResult<Value> {
        let mut state = self.state.lock();
        match request.method.as_str() {
            "get_page" => {
                let params: PageParams = serde_json::from_value(request.data)?;
                Ok(serde_json::to_value(page_window(&state.entries, params.page_index))?)
            }
            "search" => {
                let params: SearchParams = serde_json::from_value(request.data)?;
                let matching = state.entries.iter().filter(|e| matches_query(e, &params.query));
                Ok(serde_json::to_value(page_window(matching, params.page_index))?)
            }
            "login" => {
                let params: LoginParams = serde_json::from_value(request.data)?;
                let outcome = match state.accounts.get(&params.username) {
                    Some(account) if account.password == params.password => {
                        if account.is_admin {
                            LoginOutcome::Admin
                        } else {
                            LoginOutcome::User
                        }
                    }
                    Some(_) => LoginOutcome::fail("Incorrect password"),
                    None => LoginOutcome::fail("Unknown user"),
                };
                Ok(serde_json::to_value(outcome)?)
            }
            "register" => {
                let params: RegisterParams = serde_json::from_value(request.data)?;
                if params.username.is_empty() || state.accounts.contains_key(&params.username) {
                    return Ok(json!(false));
                }
                state.accounts.insert(
                    params.username,
                    Account {
                        password: params.password,
                        is_admin: params.is_admin,
                    },
                );
                Ok(json!(true))
            }
            _ => {
                let method = request.method.clone();
                let mutation: Mutation = serde_json::from_value(serde_json::to_value(&request)?)
                    .map_err(|_| ApiError::NotFound(format!("Unknown method {}", method)))?;
                if let Mutation::Add(ref entry) = mutation {
                    if state.entries.iter().any(|e| e.title == entry.title) {
                        return Err(ApiError::Conflict(format!("title {:?} already exists", entry.title)));
                    }
                }
                mutation.apply_to(&mut state.entries);
                Ok(Value::Null)
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn call(&self, request: RemoteRequest) -> ApiResult<Value> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !self.is_reachable() {
            return Err(ApiError::Unreachable);
        }

        self.requests.lock().push(request.clone());
        if self.failing_method.lock().as_deref() == Some(request.method.as_str()) {
            return Err(ApiError::ServerError(format!("{} failed", request.method)));
        }
        self.serve(request)
    }
}

#[async_trait]
impl ReachabilityProbe for MemoryTransport {
    async fn probe(&self) -> ApiResult<bool> {
        Ok(self.is_reachable())
    }
}

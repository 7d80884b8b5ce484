//! Draining the offline change log into the remote store.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::cache::LocalCache;
use crate::models::ChangeLogEntry;
use crate::store::EntryStore;

/// What to do when a replayed change fails in transit.
///
/// A change the service refuses outright (a duplicate title, say) would be
/// refused again on every retry, so it is dropped and reported under either
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Stop at the first transport failure. The failed change and everything
    /// after it stay in the log for the next reconnect.
    #[default]
    Abort,
    /// Drop the failed change and carry on with the rest of the log.
    Skip,
}

#[derive(Debug, Clone)]
pub struct ReplayFailure {
    pub change: ChangeLogEntry,
    pub error: String,
    /// The round trip failed, as opposed to the service refusing the change.
    pub transport: bool,
}

impl ReplayFailure {
    fn new(change: ChangeLogEntry, error: &ApiError) -> Self {
        Self {
            change,
            error: error.to_string(),
            transport: error.is_transport(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    /// Changes the remote store accepted.
    pub replayed: usize,
    /// Changes the service refused, plus transport failures dropped under
    /// [`ReplayPolicy::Skip`].
    pub skipped: Vec<ReplayFailure>,
    /// The failure that stopped the drain under [`ReplayPolicy::Abort`].
    pub aborted: Option<ReplayFailure>,
    /// Changes still in the log when the drain stopped.
    pub remaining: usize,
}

impl ReplayReport {
    /// True once the whole log was dealt with.
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none() && self.remaining == 0
    }

    /// Fold a later drain of the same log into this report.
    pub fn merge(&mut self, later: ReplayReport) {
        self.replayed += later.replayed;
        self.skipped.extend(later.skipped);
        self.aborted = later.aborted;
        self.remaining = later.remaining;
    }
}

/// Replay the cache's change log against `remote`, oldest change first.
///
/// Each change is sent only after the previous one resolved, and is removed
/// from the log once the remote store accepted it (or once it was skipped).
/// Changes recorded while the drain is running are drained too.
pub async fn replay(cache: &LocalCache, remote: &dyn EntryStore, policy: ReplayPolicy) -> ReplayReport {
    let mut report = ReplayReport::default();

    while let Some(change) = cache.next_change() {
        let seq = change.seq;
        match remote.apply(change.mutation.clone()).await {
            Ok(()) => {
                debug!(seq, method = %change.kind(), title = change.mutation.title(), "Replayed change");
                cache.acknowledge(seq);
                report.replayed += 1;
            }
            Err(e) => {
                let failure = ReplayFailure::new(change, &e);
                if failure.transport && policy == ReplayPolicy::Abort {
                    warn!(seq, error = %e, "Replay failed, keeping remaining changes for next reconnect");
                    report.aborted = Some(failure);
                    break;
                }
                warn!(seq, error = %e, refused = !failure.transport, "Replay failed, skipping change");
                cache.acknowledge(seq);
                report.skipped.push(failure);
            }
        }
    }

    report.remaining = cache.pending_changes();
    info!(
        replayed = report.replayed,
        skipped = report.skipped.len(),
        remaining = report.remaining,
        "Change log replay finished"
    );
    report
}

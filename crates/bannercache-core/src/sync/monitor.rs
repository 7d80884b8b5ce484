//! Connectivity detection by polling a reachability probe.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::api::ReachabilityProbe;

/// Polls the probe immediately on start and then every `interval`, and
/// publishes the result as a watch channel. Subscribers are only woken when
/// reachability actually changes.
///
/// A probe that errors or exceeds its timeout counts as unreachable.
pub struct ConnectivityMonitor {
    state: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    pub async fn start(probe: Arc<dyn ReachabilityProbe>, interval: Duration, probe_timeout: Duration) -> Self {
        let initial = check(probe.as_ref(), probe_timeout).await;
        info!(reachable = initial, "Initial reachability");

        let (tx, rx) = watch::channel(initial);
        let task = tokio::spawn(poll(probe, tx, interval, probe_timeout));
        Self { state: rx, task }
    }

    pub fn is_reachable(&self) -> bool {
        *self.state.borrow()
    }

    /// A receiver that resolves `changed()` on the next transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.clone()
    }

    /// Stop polling. Subscribers see the channel close.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll(probe: Arc<dyn ReachabilityProbe>, tx: watch::Sender<bool>, interval: Duration, probe_timeout: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial probe already ran
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let reachable = check(probe.as_ref(), probe_timeout).await;
        let changed = tx.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });
        if changed {
            info!(reachable, "Reachability changed");
        }
    }
}

/// Run the probe once. Never fails: errors and timeouts read as unreachable.
pub async fn check(probe: &dyn ReachabilityProbe, probe_timeout: Duration) -> bool {
    match tokio::time::timeout(probe_timeout, probe.probe()).await {
        Ok(Ok(reachable)) => reachable,
        Ok(Err(e)) => {
            debug!(error = %e, "Reachability probe failed");
            false
        }
        Err(_) => {
            debug!(timeout_ms = probe_timeout.as_millis() as u64, "Reachability probe timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::FutureExt;

    use crate::api::{ApiError, ApiResult, FnProbe, MemoryTransport};

    const INTERVAL: Duration = Duration::from_secs(10);
    const TIMEOUT: Duration = Duration::from_secs(5);

    struct FailingProbe;

    #[async_trait]
    impl ReachabilityProbe for FailingProbe {
        async fn probe(&self) -> ApiResult<bool> {
            Err(ApiError::Unreachable)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_reads_as_unreachable() {
        assert!(!check(&FailingProbe, TIMEOUT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_reads_as_unreachable() {
        let hanging = FnProbe(|| futures::future::pending::<bool>().boxed());
        assert!(!check(&hanging, TIMEOUT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_on_start_and_every_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let probe = FnProbe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { true }.boxed()
        });

        let monitor = ConnectivityMonitor::start(Arc::new(probe), INTERVAL, TIMEOUT).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(monitor.is_reachable());

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_are_notified_on_transitions_only() {
        let transport = Arc::new(MemoryTransport::new());
        let monitor = ConnectivityMonitor::start(transport.clone(), INTERVAL, TIMEOUT).await;
        let mut rx = monitor.subscribe();

        // Steady state: no notification
        let quiet = tokio::time::timeout(Duration::from_secs(35), rx.changed()).await;
        assert!(quiet.is_err());

        transport.set_reachable(false);
        tokio::time::timeout(Duration::from_secs(11), rx.changed())
            .await
            .expect("transition within one interval")
            .unwrap();
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_reachable());

        transport.set_reachable(true);
        tokio::time::timeout(Duration::from_secs(11), rx.changed())
            .await
            .expect("transition within one interval")
            .unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_channel() {
        let transport = Arc::new(MemoryTransport::new());
        let monitor = ConnectivityMonitor::start(transport, INTERVAL, TIMEOUT).await;
        let mut rx = monitor.subscribe();
        monitor.stop();
        assert!(rx.changed().await.is_err());
    }
}

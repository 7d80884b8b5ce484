//! bannercache - track weekly banner releases from the command line.
//!
//! Talks to the banner service when it is reachable and keeps working from
//! a local cache when it is not. Changes made offline are sent to the
//! service the next time it can be reached.

mod commands;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bannercache_core::api::{HttpTransport, MemoryTransport, ReachabilityProbe, Transport};
use bannercache_core::{CacheManager, Config, ConnectivityMonitor, SyncCoordinator};

// ============================================================================
// Constants
// ============================================================================

/// Overrides `server_url` from the config file
const SERVER_URL_ENV: &str = "BANNERCACHE_SERVER_URL";

const LOG_FILE_PREFIX: &str = "bannercache.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=debug). Besides stderr,
/// logs go to a daily file in the cache directory when it can be created.
fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

/// Everything a command needs: the coordinator and the monitor feeding it.
pub struct Session {
    pub config: Config,
    pub coordinator: SyncCoordinator,
    pub monitor: ConnectivityMonitor,
}

impl Session {
    async fn connect(config: Config, cache_dir: &Path) -> Result<Self> {
        let (transport, probe): (Arc<dyn Transport>, Arc<dyn ReachabilityProbe>) = match &config.server_url {
            Some(url) => {
                let http = Arc::new(
                    HttpTransport::with_timeout(url.clone(), config.request_timeout())
                        .with_context(|| format!("Failed to set up HTTP transport for {}", url))?,
                );
                let transport: Arc<dyn Transport> = http.clone();
                let probe: Arc<dyn ReachabilityProbe> = http;
                (transport, probe)
            }
            None => {
                warn!("No server configured (set {} or server_url), working offline", SERVER_URL_ENV);
                let memory = Arc::new(MemoryTransport::new());
                memory.set_reachable(false);
                let transport: Arc<dyn Transport> = memory.clone();
                let probe: Arc<dyn ReachabilityProbe> = memory;
                (transport, probe)
            }
        };

        let monitor = ConnectivityMonitor::start(probe, config.poll_interval(), config.probe_timeout()).await;
        let cache = CacheManager::new(cache_dir.to_path_buf())?;
        let coordinator = SyncCoordinator::new(transport, monitor.is_reachable())
            .with_replay_policy(config.replay_policy)
            .with_cache_manager(cache);
        coordinator.resume_offline_session().await;

        Ok(Self {
            config,
            coordinator,
            monitor,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    if let Ok(url) = std::env::var(SERVER_URL_ENV) {
        if !url.trim().is_empty() {
            config.server_url = Some(url.trim().to_string());
        }
    }
    let cache_dir = config.cache_dir()?;

    let _log_guard = init_tracing(&cache_dir);
    info!("bannercache starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        commands::print_usage();
        return Ok(());
    };
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        commands::print_usage();
        return Ok(());
    }

    let session = Session::connect(config, &cache_dir).await?;
    let result = commands::run(&session, command, &args[1..]).await;

    session.monitor.stop();
    info!("bannercache shutting down");
    result
}

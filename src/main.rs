//! Ferryman - cross-platform chat bridge
//!
//! Mirrors messages between channels on independently operated chat
//! services and keeps every mirrored copy in sync when the original is
//! edited.

mod adapter;
mod bridge;
mod common;
mod config;
mod discord;
mod ledger;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use backon::BackoffBuilder;
use futures::future::join_all;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use adapter::{AdapterRegistry, SharedAdapter};
use bridge::{BridgeController, BridgeGraph, MessageFilter};
use common::error::{AdapterError, AdapterResult, AppError};
use config::{env::get_config_path, load_and_validate, Config};
use ledger::{CorrelationLedger, SqliteLedger};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Ferryman v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Bots: {}", config.bots.len());
    info!("  Channels: {}", config.channels.len());
    info!("  Bridge groups: {}", config.bridges.len());

    let Bridge {
        ledger,
        controller,
        adapters,
    } = assemble(&config).await.map_err(|e| {
        error!("Failed to start the bridge: {}", e);
        e
    })?;

    // ============================================================
    // Run every adapter's inbound loop
    // ============================================================
    let mut tasks = JoinSet::new();
    for adapter in adapters {
        let controller = controller.clone();
        tasks.spawn(async move {
            let id = adapter.id().to_string();
            (id, adapter.run(controller).await)
        });
    }

    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - closing adapters...");
            true
        }
        _ = wait_for_adapters(&mut tasks) => {
            warn!("Every adapter stopped");
            false
        }
    };

    // Handle graceful shutdown
    if shutdown {
        controller.close_adapters().await;
        let timeout = Duration::from_secs(5);
        if tokio::time::timeout(timeout, wait_for_adapters(&mut tasks)).await.is_err() {
            warn!("Adapters did not stop within {:?}, aborting them", timeout);
            tasks.abort_all();
        }

        if config.database.purge_on_shutdown {
            if let Err(e) = ledger.purge().await {
                error!("Failed to purge correlation ledger: {}", e);
            }
        }
    }

    ledger.close().await;
    info!("Exiting...");
    Ok(())
}

/// Everything the bridge needs at runtime.
struct Bridge {
    ledger: SqliteLedger,
    controller: Arc<BridgeController>,
    adapters: Vec<SharedAdapter>,
}

/// Open the ledger, start the adapters and wire them into a controller.
async fn assemble(config: &Config) -> Result<Bridge, AppError> {
    let ledger = SqliteLedger::connect(&config.database.url).await?;

    let adapters = start_adapters(config).await;
    if adapters.is_empty() {
        ledger.close().await;
        return Err(AppError::NoAdapters);
    }

    let active: HashSet<String> = adapters.iter().map(|a| a.id().to_string()).collect();
    let graph = match BridgeGraph::from_config(config, |bot| active.contains(bot)) {
        Ok(graph) => graph,
        Err(e) => {
            ledger.close().await;
            return Err(e.into());
        }
    };
    info!("Bridge graph built with {} routes", graph.edge_count());
    if graph.is_empty() {
        warn!("No bridge routes between running adapters - nothing will be mirrored");
    }

    let filter = MessageFilter::new(config.filter_patterns());
    if filter.has_patterns() {
        info!("Relay filter enabled");
    }

    let shared_ledger: Arc<dyn CorrelationLedger> = Arc::new(ledger.clone());
    let controller = Arc::new(BridgeController::new(
        graph,
        adapters.iter().cloned(),
        shared_ledger,
        filter,
    ));

    Ok(Bridge {
        ledger,
        controller,
        adapters,
    })
}

/// Build every configured adapter and initialize them concurrently.
///
/// Adapters that cannot be built or initialized are left out and logged.
async fn start_adapters(config: &Config) -> Vec<SharedAdapter> {
    let registry = AdapterRegistry::with_builtin();

    let mut built = Vec::new();
    for (id, bot) in &config.bots {
        match registry.build(id, bot) {
            Ok(adapter) => built.push(adapter),
            Err(e) => error!("Skipping bot '{}': {}", id, e),
        }
    }

    let inits = built.into_iter().map(|adapter| async move {
        let channels = config.channels_for_bot(adapter.id());
        match init_with_retry(&adapter, &channels).await {
            Ok(()) => {
                info!("Adapter '{}' ready ({} channels)", adapter.id(), channels.len());
                Some(adapter)
            }
            Err(e) => {
                error!("Adapter '{}' failed to initialize, excluding it: {}", adapter.id(), e);
                None
            }
        }
    });

    join_all(inits).await.into_iter().flatten().collect()
}

/// Create an exponential backoff iterator for adapter initialization.
/// 2s initial, 30s max, with jitter, 3 retries.
fn init_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(2))
        .with_max_delay(Duration::from_secs(30))
        .with_jitter()
        .with_max_times(3)
        .build()
}

async fn init_with_retry(adapter: &SharedAdapter, channels: &[String]) -> AdapterResult<()> {
    let mut backoff = init_backoff();

    loop {
        let error = match adapter.init(channels).await {
            Ok(()) => return Ok(()),
            // A malformed channel id will not fix itself.
            Err(e @ AdapterError::InvalidChannel { .. }) => return Err(e),
            Err(e) => e,
        };

        match backoff.next() {
            Some(delay) => {
                warn!(
                    "Adapter '{}' init failed: {}. Retrying in {:.1}s...",
                    adapter.id(),
                    error,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
            None => return Err(error),
        }
    }
}

/// Drain adapter tasks, logging how each one ended.
async fn wait_for_adapters(tasks: &mut JoinSet<(String, AdapterResult<()>)>) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, Ok(()))) => info!("Adapter '{}' stopped", id),
            Ok((id, Err(e))) => error!("Adapter '{}' stopped with error: {}", id, e),
            Err(e) if e.is_cancelled() => debug!("Adapter task cancelled"),
            Err(e) => warn!("Adapter task panicked: {}", e),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

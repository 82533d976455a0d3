//! Progression store host process.
//!
//! Opens the configured backend and every cache, then keeps the write-back
//! state durable until shutdown: periodic `save_all` checkpoints while
//! running and one final flush on Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `progression-config.yaml`
//!    (or the path in `PROGRESSION_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect the backend and create every table
//! 4. Forward level-up events to the log
//! 5. Checkpoint on an interval until Ctrl-C
//! 6. Flush every cache and close connections

mod error;
mod stores;

use std::path::PathBuf;
use std::time::Duration;

use progression_core::config::LoggingConfig;
use progression_core::{LevelTransitionNotifier, ProgressionConfig, TracingNotifier};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ServerError;
use crate::stores::Stores;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "progression-config.yaml";

/// Application entry point for the progression server.
///
/// # Errors
///
/// Returns an error if configuration, logging or backend setup fails.
#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 1. Load configuration.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(
        config = %config_path.display(),
        backend = ?config.infrastructure.backend,
        max_level = config.leveling.max_level,
        domains = config.domains.len(),
        "progression-server starting"
    );

    // 3. Open stores.
    let stores = Stores::open(&config).await?;
    for name in stores.domain_names() {
        if let Some(cache) = stores.domain(name) {
            info!(
                domain = name,
                table = cache.domain(),
                keys = cache.schema().len(),
                "Keyed domain ready"
            );
        }
    }

    // 4. Level-up events.
    let mut events = stores.events().subscribe();
    let _event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => TracingNotifier.on_level_up(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Level-up log lagged, skipping ahead");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 5. Checkpoint until shutdown.
    run_checkpoints(&stores, config.persistence.checkpoint_interval()).await;

    // 6. Final flush.
    info!("Shutdown requested, flushing caches");
    stores.shutdown().await;
    info!("progression-server stopped");
    Ok(())
}

/// Load configuration from `PROGRESSION_CONFIG` or the default path.
///
/// A missing file yields the defaults with environment overrides applied.
fn load_config() -> Result<(ProgressionConfig, PathBuf), ServerError> {
    let path = std::env::var_os("PROGRESSION_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = if path.exists() {
        ProgressionConfig::from_file(&path)?
    } else {
        let mut config = ProgressionConfig::default();
        config.infrastructure.apply_env_overrides();
        config
    };
    Ok((config, path))
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_logging(logging: &LoggingConfig) -> Result<(), ServerError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| ServerError::Logging {
        message: e.to_string(),
    })
}

/// Run `save_all` checkpoints every `interval` until Ctrl-C.
async fn run_checkpoints(stores: &Stores, interval: Option<Duration>) {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let Some(period) = interval else {
        info!("Periodic checkpoints disabled");
        shutdown.await;
        return;
    };

    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;
    info!(interval_secs = period.as_secs(), "Checkpoint loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let count = stores.checkpoint().await;
                debug!(count, "Checkpoint complete");
            }
            () = &mut shutdown => break,
        }
    }
}

/// Resolve on Ctrl-C. If the handler cannot be installed, never resolve.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

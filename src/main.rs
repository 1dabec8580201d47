//! Degraded-mode coordinator daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!     Conversation engine                     Service clients
//!            │                                (cache, graph, workers)
//!            ▼                                        │ update_status
//!   ┌──────────────────────┐   watch    ┌─────────────▼──────────┐
//!   │ FailoverCheckpoint-  │──────────▶ │ ComponentHealthRegistry │──▶ status() / features
//!   │ Store                │            └─────────────┬──────────┘
//!   │  durable │ volatile  │  reset()                 │ attempt_recovery
//!   └──────────┴───────────┘◀──────────── probes ◀────┘
//!            ▲                                        ▲
//!            │ cleanup / prune                        │ tick / backoff
//!   ┌────────┴─────────┐                   ┌──────────┴──────────┐
//!   │ MaintenanceJob   │                   │ RecoveryOrchestrator │
//!   └──────────────────┘                   └─────────────────────┘
//! ```
//!
//! # Signals
//! - SIGINT / SIGTERM: graceful shutdown
//! - SIGHUP: reset the recovery attempt budget. Once the budget is used up, automatic
//!   recovery stops and logs an ERROR; SIGHUP or a restart resumes it.

use std::path::PathBuf;

use clap::Parser;

use degraded_mode::config::{load_config, ResilienceConfig};
use degraded_mode::lifecycle::{
    reset_recovery_on_hangup, wait_for_shutdown_signal, ResilienceService, Shutdown,
};
use degraded_mode::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "degraded-mode")]
#[command(about = "Dependency health and checkpoint failover coordinator", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };
    logging::init_logging(&config.observability);

    tracing::info!("degraded-mode v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        store_path = %config.store.path,
        failure_threshold = config.store.failure_threshold,
        fallback_enabled = config.store.fallback_enabled,
        recovery_interval_secs = config.recovery.interval_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let service = ResilienceService::build(config).await?;
    let shutdown = Shutdown::new();

    let orchestrator = tokio::spawn(service.orchestrator().run(shutdown.subscribe()));
    let maintenance = tokio::spawn(service.maintenance().run(shutdown.subscribe()));
    let hangup = tokio::spawn(reset_recovery_on_hangup(
        service.registry.clone(),
        shutdown.subscribe(),
    ));

    wait_for_shutdown_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();

    for (name, task) in [
        ("orchestrator", orchestrator),
        ("maintenance", maintenance),
        ("hangup", hangup),
    ] {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Background task failed");
        }
    }

    let status = service.registry.status();
    tracing::info!(
        level = %status.degradation_level,
        stranded_threads = service.volatile.stats().threads,
        "Shutdown complete"
    );
    Ok(())
}

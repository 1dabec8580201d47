use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures_util::TryStreamExt;
use serde::Serialize;
use serde_json::json;

use degraded_mode::checkpoint::{CheckpointConfig, CheckpointStore, ListOptions, RetentionPolicy};
use degraded_mode::config::{load_config, ObservabilityConfig, ResilienceConfig, MAX_RETENTION_DAYS};
use degraded_mode::lifecycle::ResilienceService;
use degraded_mode::observability::logging;

#[derive(Parser)]
#[command(name = "checkpoint-cli")]
#[command(about = "Management CLI for dependency health and the checkpoint store", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every component once and print the system status
    Status,
    /// List threads in the durable store
    Threads,
    /// Show the checkpoint history of one thread, newest first
    History {
        #[arg(short, long)]
        thread: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Prune old checkpoints from the durable store
    Prune {
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_RETENTION_DAYS)))]
        retention_days: Option<u32>,

        #[arg(long)]
        max_per_thread: Option<usize>,

        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };
    logging::init_logging(&ObservabilityConfig {
        log_level: "warn".to_string(),
        ..config.observability.clone()
    });

    let service = ResilienceService::build(config).await?;

    match cli.command {
        Commands::Status => {
            let probes = service.registry.check_all().await;
            service.orchestrator().sync_store_health();
            let status = service.registry.status();
            print_json(&json!({
                "status": &*status,
                "probes": probes,
                "store": service.store.status(),
            }))?;
        }
        Commands::Threads => {
            print_json(&service.durable.thread_ids().await?)?;
        }
        Commands::History { thread, limit } => {
            let options = ListOptions {
                limit,
                before: None,
            };
            let history: Vec<_> = service
                .durable
                .list(&CheckpointConfig::thread(thread), options)
                .await?
                .try_collect()
                .await?;
            print_json(&history)?;
        }
        Commands::Prune {
            retention_days,
            max_per_thread,
            dry_run,
        } => {
            let defaults = &service.config.maintenance;
            let policy = RetentionPolicy {
                retention_days: retention_days.unwrap_or(defaults.retention_days),
                max_per_thread: max_per_thread.unwrap_or(defaults.max_per_thread),
                dry_run,
            };
            print_json(&service.durable.prune(&policy).await?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

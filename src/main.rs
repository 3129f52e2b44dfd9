use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dj_scheduler::config::{LoggingConfig, SchedulerConfig};
use dj_scheduler::queue::{FsMediaProbe, RoundRobinQueue};
use dj_scheduler::snapshot::SnapshotStore;

#[derive(Parser)]
#[command(
    name = "dj-scheduler",
    about = "Fair round-robin request queue for community radio",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (queue, playback timer, rating sweep, API server)
    Serve {
        /// Path to the TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the play order stored in a queue snapshot
    Inspect {
        /// Snapshot file (defaults to queue.snapshot_path from the config)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Path to the TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum number of tracks to list (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },

    /// Print the effective configuration as TOML
    CheckConfig {
        /// Path to the TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let cfg = SchedulerConfig::resolve(config.as_deref())?;
            init_tracing(&cfg.logging);
            tracing::info!(bind = %cfg.api.bind, "Starting dj-scheduler daemon");
            dj_scheduler::serve(cfg).await?;
        }
        Commands::Inspect {
            snapshot,
            config,
            limit,
        } => {
            let cfg = SchedulerConfig::resolve(config.as_deref())?;
            init_tracing(&cfg.logging);
            let path = snapshot.unwrap_or(cfg.queue.snapshot_path);
            let saved = SnapshotStore::new(&path)
                .read()
                .with_context(|| format!("failed to read snapshot: {}", path.display()))?;
            let queue = RoundRobinQueue::from_snapshot(Arc::new(FsMediaProbe), saved);

            println!("\nQueue snapshot: {}", path.display());
            println!(
                "Submitters in order: {}   Tracks queued: {}   Last id: {}",
                queue.queue_len(),
                queue.tracks_queue_len(),
                queue.last_id()
            );
            println!();
            println!("{:<5} | {:<8} | {:<12} | Title", "#", "Id", "Submitter");
            println!("{:-<5}-|-{:-<8}-|-{:-<12}-|-{:-<40}", "", "", "", "");
            let tracks = queue.queue_tracks(0, limit);
            if tracks.is_empty() {
                println!("(queue is empty)");
            }
            for (i, track) in tracks.iter().enumerate() {
                println!(
                    "{:<5} | {:<8} | {:<12} | {}",
                    i + 1,
                    track.id,
                    track.submitter.to_string(),
                    track.full_title()
                );
            }
            println!();
        }
        Commands::CheckConfig { config } => {
            let cfg = SchedulerConfig::resolve(config.as_deref())?;
            init_tracing(&cfg.logging);
            let rendered =
                toml::to_string_pretty(&cfg).context("failed to render configuration")?;
            println!("{}", rendered);
        }
    }

    Ok(())
}

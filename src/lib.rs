//! dj-scheduler -- fair round-robin request queue for a community radio.
//!
//! The library holds the queue engine and the rating policy behind the
//! [`scheduler::Scheduler`] facade; [`serve`] runs it as a daemon with the
//! HTTP control API.

pub mod api;
pub mod config;
pub mod error;
pub mod queue;
pub mod rating;
pub mod scheduler;
pub mod snapshot;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::SchedulerConfig;
use crate::queue::FsMediaProbe;
use crate::scheduler::{Collaborators, LogNotifier, MemoryDirectory, Scheduler, TimedPlayback};

/// Start the scheduler daemon: restore the queue, start playback, run the
/// background loops and the API server until Ctrl-C.
pub async fn serve(config: SchedulerConfig) -> Result<()> {
    // 1. Collaborators
    let (playback, events) = TimedPlayback::new(
        Duration::from_secs(config.playback.default_track_sec),
        Duration::from_millis(config.playback.end_margin_ms),
    );
    let directory =
        MemoryDirectory::from_config(&config.users, config.rating.active_window_minutes);
    let collaborators = Collaborators {
        directory: Arc::new(directory),
        playback: Arc::new(playback),
        notifier: Arc::new(LogNotifier),
    };

    // 2. Restore queue state
    let scheduler = Arc::new(Scheduler::init(
        &config,
        collaborators,
        Arc::new(FsMediaProbe),
    ));

    // 3. Start playback and background loops
    scheduler.advance();
    let sweep_period = Duration::from_secs(config.rating.sweep_interval_sec.max(1));
    tokio::spawn(scheduler::run_sweep_loop(scheduler.clone(), sweep_period));
    tokio::spawn(scheduler::run_playback_loop(scheduler.clone(), events));

    // 4. Start API server
    let addr: SocketAddr = config
        .api
        .bind
        .parse()
        .with_context(|| format!("invalid api.bind address: {}", config.api.bind))?;
    let app = api::router(api::state::AppState::new(scheduler.clone()));

    tracing::info!(%addr, "dj-scheduler listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Persist
    tracing::info!("shutting down, saving queue");
    if scheduler.shutdown().is_err() {
        tracing::warn!("queue state was not saved");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

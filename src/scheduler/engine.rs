use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::ports::PlaybackEvent;
use super::Scheduler;

/// Periodic rating sweep.
/// Evicts queued tracks the listeners voted down, every `period`.
pub async fn run_sweep_loop(scheduler: Arc<Scheduler>, period: Duration) {
    info!(period_sec = period.as_secs(), "rating sweep started");

    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;

        let evicted = scheduler.sweep();
        if evicted > 0 {
            info!(evicted, "rating sweep evicted tracks");
        } else {
            debug!("rating sweep found nothing to evict");
        }
    }
}

/// Turns playback-driver events into scheduling steps.
/// Returns when every sender is gone.
pub async fn run_playback_loop(
    scheduler: Arc<Scheduler>,
    mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
) {
    info!("playback event loop started");

    while let Some(event) = events.recv().await {
        match event {
            PlaybackEvent::TrackEnded(id) => {
                debug!(track_id = id, "track ended");
                if let Some(step) = scheduler.on_track_ended(id) {
                    if step.playing.is_none() {
                        info!("queue exhausted after track end");
                    }
                }
            }
        }
    }

    info!("playback event loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MediaProbe, RoundRobinQueue, SubmitterId};
    use crate::rating::RatingGuard;
    use crate::scheduler::{
        Collaborators, LogNotifier, MemoryDirectory, RequestQuota, TimedPlayback,
    };
    use crate::snapshot::SnapshotStore;

    struct Always;
    impl MediaProbe for Always {
        fn is_playable(&self, _media: &str) -> bool {
            true
        }
    }

    fn scheduler(
        dir: &tempfile::TempDir,
    ) -> (Arc<Scheduler>, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (playback, events) = TimedPlayback::new(Duration::from_secs(180), Duration::ZERO);
        let scheduler = Scheduler::new(
            RoundRobinQueue::new(Arc::new(Always)),
            RatingGuard::default(),
            SnapshotStore::new(dir.path().join("queue.json")),
            RequestQuota::new(10, Duration::from_secs(600)),
            Collaborators {
                directory: Arc::new(MemoryDirectory::new(chrono::Duration::minutes(60))),
                playback: Arc::new(playback),
                notifier: Arc::new(LogNotifier),
            },
        );
        (Arc::new(scheduler), events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_end_advances_playback() {
        let dir = tempfile::TempDir::new().unwrap();
        let (scheduler, events) = scheduler(&dir);
        let first = scheduler
            .submit_track("/m/a.mp3", None, None, 5, SubmitterId::User(1))
            .unwrap()
            .0;
        let second = scheduler
            .submit_track("/m/b.mp3", None, None, 5, SubmitterId::User(2))
            .unwrap()
            .0;

        tokio::spawn(run_playback_loop(scheduler.clone(), events));
        scheduler.advance();
        assert_eq!(scheduler.current().map(|t| t.id), Some(first.id));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(scheduler.current().map(|t| t.id), Some(second.id));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(scheduler.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_loop_evicts_hated_tracks() {
        let dir = tempfile::TempDir::new().unwrap();
        let (scheduler, _events) = scheduler(&dir);
        let track = scheduler
            .submit_track("/m/a.mp3", None, None, 5, SubmitterId::User(1))
            .unwrap()
            .0;
        for voter in [2, 3, 4] {
            scheduler.vote_down(voter, track.id).unwrap();
        }

        tokio::spawn(run_sweep_loop(scheduler.clone(), Duration::from_secs(30)));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(scheduler.stats().tracks_total, 0);
    }
}

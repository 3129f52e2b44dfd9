//! Collaborators the scheduler talks to, and the in-process implementations
//! used by the daemon.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::{Track, TrackId, UserId};

/// Listener registry consulted for activity, privilege and bans.
pub trait UserDirectory: Send + Sync {
    /// Acted within the recency window.
    fn is_active(&self, user: UserId) -> bool;

    fn is_superuser(&self, user: UserId) -> bool;

    fn is_banned(&self, user: UserId) -> bool;

    /// Number of listeners currently active.
    fn active_count(&self) -> usize;

    /// Mark `user` as having just acted.
    fn record_activity(&self, user: UserId);

    /// Set or lift a ban.
    fn set_banned(&self, user: UserId, banned: bool);
}

/// Output side of the radio.
pub trait PlaybackDriver: Send + Sync {
    fn switch_track(&self, track: &Track);

    fn stop(&self);
}

/// Delivers messages to listeners.
pub trait Notifier: Send + Sync {
    fn notify(&self, user: UserId, message: &str);
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Writes notifications to the log; used when no chat front-end is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user: UserId, message: &str) {
        info!(user, text = message, "notification");
    }
}

// ---------------------------------------------------------------------------
// TimedPlayback
// ---------------------------------------------------------------------------

/// Emitted by a playback driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    TrackEnded(TrackId),
}

/// Playback driver that only keeps time.
///
/// Each switch arms a timer for the track's duration (minus a small margin so
/// the next track starts without a gap) and reports `TrackEnded` on a channel.
/// Switching or stopping cancels the pending timer.
pub struct TimedPlayback {
    events: mpsc::UnboundedSender<PlaybackEvent>,
    timer: Mutex<Option<JoinHandle<()>>>,
    default_track: Duration,
    end_margin: Duration,
}

impl TimedPlayback {
    pub fn new(
        default_track: Duration,
        end_margin: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let driver = Self {
            events,
            timer: Mutex::new(None),
            default_track,
            end_margin,
        };
        (driver, rx)
    }

    fn play_time(&self, track: &Track) -> Duration {
        let full = if track.duration_sec == 0 {
            self.default_track
        } else {
            Duration::from_secs(u64::from(track.duration_sec))
        };
        full.saturating_sub(self.end_margin)
    }

    fn replace_timer(&self, next: Option<JoinHandle<()>>) {
        let mut timer = self
            .timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = next;
    }
}

impl PlaybackDriver for TimedPlayback {
    fn switch_track(&self, track: &Track) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(track_id = track.id, "no async runtime, track end will not be reported");
            self.replace_timer(None);
            return;
        };

        let wait = self.play_time(track);
        let events = self.events.clone();
        let id = track.id;
        debug!(track_id = id, wait_ms = wait.as_millis() as u64, "track timer armed");
        let handle = runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = events.send(PlaybackEvent::TrackEnded(id));
        });
        self.replace_timer(Some(handle));
    }

    fn stop(&self) {
        debug!("playback stopped");
        self.replace_timer(None);
    }
}

impl Drop for TimedPlayback {
    fn drop(&mut self) {
        self.replace_timer(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SubmitterId;

    fn track(id: TrackId, duration_sec: u32) -> Track {
        Track::new(id, "/m/a.mp3", None, None, duration_sec, SubmitterId::User(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_reports_track_end() {
        let (driver, mut rx) =
            TimedPlayback::new(Duration::from_secs(180), Duration::from_millis(300));
        driver.switch_track(&track(5, 2));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, PlaybackEvent::TrackEnded(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_cancels_previous_timer() {
        let (driver, mut rx) = TimedPlayback::new(Duration::from_secs(180), Duration::ZERO);
        driver.switch_track(&track(1, 10));
        driver.switch_track(&track(2, 20));

        assert_eq!(rx.recv().await.unwrap(), PlaybackEvent::TrackEnded(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let (driver, mut rx) = TimedPlayback::new(Duration::from_secs(180), Duration::ZERO);
        driver.switch_track(&track(1, 1));
        driver.stop();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_duration_uses_default() {
        let (driver, _rx) =
            TimedPlayback::new(Duration::from_secs(180), Duration::from_millis(300));
        assert_eq!(driver.play_time(&track(1, 0)), Duration::from_millis(179_700));
        assert_eq!(driver.play_time(&track(1, 10)), Duration::from_millis(9_700));
    }
}

//! The scheduler facade.
//!
//! [`Scheduler`] owns the queue and ties it to the rating policy, the
//! snapshot store and the collaborators (user directory, playback driver,
//! notifier). It is the unit the API and the background loops talk to.
//!
//! Lifecycle: [`Scheduler::init`] loads the snapshot and the fallback media,
//! the daemon operates on it, and [`Scheduler::shutdown`] writes the snapshot
//! back.

pub mod directory;
pub mod engine;
pub mod ports;
pub mod quota;
pub mod views;

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError, SnapshotError};
use crate::queue::{
    scan_dir, MediaProbe, RoundRobinQueue, SubmitterId, Track, TrackId, TrackPosition, UserId,
};
use crate::rating::RatingGuard;
use crate::snapshot::SnapshotStore;

pub use self::directory::MemoryDirectory;
pub use self::engine::{run_playback_loop, run_sweep_loop};
pub use self::ports::{
    LogNotifier, Notifier, PlaybackDriver, PlaybackEvent, TimedPlayback, UserDirectory,
};
pub use self::quota::RequestQuota;
pub use self::views::{Advance, QueueView, StateView, Stats, TrackInfo};

/// External services the scheduler depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn UserDirectory>,
    pub playback: Arc<dyn PlaybackDriver>,
    pub notifier: Arc<dyn Notifier>,
}

struct NowPlaying {
    track: Track,
    started: Instant,
}

pub struct Scheduler {
    queue: RoundRobinQueue,
    guard: RatingGuard,
    store: SnapshotStore,
    quota: RequestQuota,
    directory: Arc<dyn UserDirectory>,
    playback: Arc<dyn PlaybackDriver>,
    notifier: Arc<dyn Notifier>,
    now_playing: Mutex<Option<NowPlaying>>,
    /// Serialises `advance` so two triggers never pop for the same slot.
    advancing: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        queue: RoundRobinQueue,
        guard: RatingGuard,
        store: SnapshotStore,
        quota: RequestQuota,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            queue,
            guard,
            store,
            quota,
            directory: collaborators.directory,
            playback: collaborators.playback,
            notifier: collaborators.notifier,
            now_playing: Mutex::new(None),
            advancing: Mutex::new(()),
        }
    }

    /// Build a scheduler from configuration: restore the saved queue and
    /// fill the backlog from the fallback media directory.
    pub fn init(
        config: &SchedulerConfig,
        collaborators: Collaborators,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        let store = SnapshotStore::new(&config.queue.snapshot_path);
        let snapshot = store.load();
        let already_played: HashSet<String> = snapshot
            .backlog_already_played_media_refs
            .iter()
            .cloned()
            .collect();
        let queue = RoundRobinQueue::from_snapshot(probe, snapshot);

        let dir = &config.queue.fallback_media_dir;
        match scan_dir(dir, &config.queue.fallback_extensions) {
            Ok(entries) => {
                info!(dir = %dir.display(), files = entries.len(), "fallback media scanned");
                queue.populate_backlog(entries, &already_played);
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "unable to read fallback media directory");
            }
        }

        Self::new(
            queue,
            RatingGuard::from_config(&config.rating),
            store,
            RequestQuota::from_config(&config.requests),
            collaborators,
        )
    }

    pub fn queue(&self) -> &RoundRobinQueue {
        &self.queue
    }

    fn now_playing(&self) -> MutexGuard<'_, Option<NowPlaying>> {
        self.now_playing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<Track> {
        self.now_playing().as_ref().map(|np| np.track.clone())
    }

    // -- Policy --------------------------------------------------------------

    fn check_not_banned(&self, user: UserId) -> Result<()> {
        if self.directory.is_banned(user) {
            warn!(user, "request from banned user refused");
            return Err(SchedulerError::Banned(user));
        }
        Ok(())
    }

    /// Owner-or-superuser check for an operation on `track`.
    fn check_owner(&self, requester: UserId, track: &Track) -> Result<()> {
        if self.directory.is_superuser(requester) || track.submitter.user() == Some(requester) {
            Ok(())
        } else {
            Err(SchedulerError::PermissionDenied(requester))
        }
    }

    fn check_superuser(&self, requester: UserId) -> Result<()> {
        if self.directory.is_superuser(requester) {
            Ok(())
        } else {
            Err(SchedulerError::PermissionDenied(requester))
        }
    }

    fn is_acceptable(&self, track: &Track) -> bool {
        let listeners = self.directory.active_count();
        let haters = track
            .haters
            .iter()
            .filter(|u| self.directory.is_active(**u))
            .count();
        self.guard.is_acceptable(listeners, haters)
    }

    fn notify_submitter(&self, track: &Track, message: &str) {
        if let Some(user) = track.submitter.user() {
            self.notifier.notify(user, message);
        }
    }

    fn notify_evicted(&self, track: &Track) {
        self.notify_submitter(
            track,
            &format!(
                "Your track was removed from the queue because other listeners dislike it:\n{}",
                track.full_title()
            ),
        );
    }

    // -- Submission ----------------------------------------------------------

    /// Add a track for `submitter` and make sure they are in the order.
    ///
    /// Real listeners are subject to the ban list and the request quota;
    /// community-pool tracks are not.
    pub fn submit_track(
        &self,
        media: impl Into<String>,
        title: Option<String>,
        artist: Option<String>,
        duration_sec: u32,
        submitter: SubmitterId,
    ) -> Result<(Track, Option<TrackPosition>)> {
        if let Some(user) = submitter.user() {
            self.check_not_banned(user)?;
            if !self.directory.is_superuser(user) && !self.quota.try_acquire(user) {
                return Err(SchedulerError::QuotaReached(user));
            }
            self.directory.record_activity(user);
        }

        let track = self
            .queue
            .add_track(media, title, artist, duration_sec, submitter);
        if !self.queue.is_in_order(submitter) {
            self.queue.enter_order(submitter);
        }
        let position = self.queue.track_position(&track);
        info!(track_id = track.id, %submitter, title = %track.full_title(), ?position, "track submitted");
        Ok((track, position))
    }

    /// Put `user` in the round-robin order and tell them where they stand.
    pub fn enqueue(&self, user: UserId) -> Result<Option<usize>> {
        self.check_not_banned(user)?;
        let position = self.queue.enter_order(SubmitterId::User(user));
        match position {
            Some(p) => self
                .notifier
                .notify(user, &format!("Your position in the queue: {}", p)),
            None => self.notifier.notify(
                user,
                "Add at least one track to your playlist before joining the queue",
            ),
        }
        Ok(position)
    }

    pub fn leave(&self, user: UserId) -> Result<Option<usize>> {
        self.check_not_banned(user)?;
        Ok(self.queue.leave_order(SubmitterId::User(user)))
    }

    /// Submissions `user` may still make in the current quota window.
    /// `None` for superusers, who are not limited.
    pub fn remaining_requests(&self, user: UserId) -> Option<usize> {
        if self.directory.is_superuser(user) {
            None
        } else {
            Some(self.quota.remaining(user))
        }
    }

    // -- Playback ------------------------------------------------------------

    /// Start the next acceptable track.
    ///
    /// Candidates are popped until one passes the rating policy; rejected
    /// ones are dropped and their submitters told. With nothing left the
    /// playback driver is stopped.
    pub fn advance(&self) -> Advance {
        let advancing = self.lock_advancing();
        self.advance_locked(&advancing)
    }

    fn lock_advancing(&self) -> MutexGuard<'_, ()> {
        self.advancing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Body of [`Scheduler::advance`]; the caller holds the `advancing` lock.
    fn advance_locked(&self, _advancing: &MutexGuard<'_, ()>) -> Advance {
        let playing = loop {
            let Some(track) = self.queue.pop_next() else {
                break None;
            };
            if self.is_acceptable(&track) {
                break Some(track);
            }
            info!(track_id = track.id, title = %track.full_title(), "track skipped due to low rating");
            self.notify_evicted(&track);
        };

        let Some(track) = playing else {
            *self.now_playing() = None;
            self.playback.stop();
            info!("nothing left to play, playback stopped");
            return Advance::default();
        };

        debug!(track_id = track.id, haters = track.haters.len(), "track rating");
        let upcoming = self.queue.peek_next();
        // Current before the driver starts, so an immediate end signal matches.
        *self.now_playing() = Some(NowPlaying {
            track: track.clone(),
            started: Instant::now(),
        });
        self.playback.switch_track(&track);
        self.announce(&track, upcoming.as_ref());

        Advance {
            playing: Some(track),
            upcoming,
        }
    }

    fn announce(&self, playing: &Track, upcoming: Option<&Track>) {
        let current_user = playing.submitter.user();
        let next_user = upcoming.and_then(|t| t.submitter.user());

        match (current_user, upcoming, next_user) {
            (Some(cur), Some(next), Some(nu)) if cur == nu => {
                self.notifier.notify(
                    cur,
                    &format!(
                        "Now playing your track:\n{}\n\nThe next one is yours too:\n{}",
                        playing.full_title(),
                        next.full_title()
                    ),
                );
            }
            _ => {
                if let (Some(next), Some(nu)) = (upcoming, next_user) {
                    self.notifier
                        .notify(nu, &format!("Your track is up next:\n{}", next.full_title()));
                }
                if let Some(cur) = current_user {
                    self.notifier
                        .notify(cur, &format!("Now playing your track:\n{}", playing.full_title()));
                }
            }
        }
    }

    /// Handle a track-ended signal from the playback driver.
    ///
    /// Signals for a track that is no longer current are stale and ignored.
    /// The check runs under the `advancing` lock, so a skip that won the
    /// race makes the signal stale.
    pub fn on_track_ended(&self, id: TrackId) -> Option<Advance> {
        let advancing = self.lock_advancing();
        let current = self.now_playing().as_ref().map(|np| np.track.id);
        if current != Some(id) {
            debug!(track_id = id, ?current, "stale track-ended signal ignored");
            return None;
        }
        Some(self.advance_locked(&advancing))
    }

    /// Evict every queued track the rating policy no longer accepts.
    ///
    /// Returns the number of evicted tracks.
    pub fn sweep(&self) -> usize {
        let mut evicted = 0;
        for track in self.queue.queue_tracks(0, 0) {
            if self.is_acceptable(&track) {
                continue;
            }
            if self.queue.remove_track(track.id).is_some() {
                info!(track_id = track.id, title = %track.full_title(), "track removed from queue due to low rating");
                self.notify_evicted(&track);
                evicted += 1;
            }
        }
        evicted
    }

    /// Skip the current track. Allowed for superusers and the track's
    /// submitter.
    pub fn skip(&self, requester: UserId) -> Result<Advance> {
        self.check_not_banned(requester)?;
        let advancing = self.lock_advancing();
        if !self.directory.is_superuser(requester) {
            let current = self.current().ok_or(SchedulerError::NothingPlaying)?;
            self.check_owner(requester, &current)?;
        }
        info!(requester, "track skipped on request");
        Ok(self.advance_locked(&advancing))
    }

    /// Stop playback, keeping the current track first in line.
    pub fn stop_playback(&self, requester: UserId) -> Result<()> {
        self.check_not_banned(requester)?;
        self.check_superuser(requester)?;
        if let Some(np) = self.now_playing().take() {
            self.queue.requeue_front(np.track);
        }
        self.playback.stop();
        info!(requester, "playback stopped on request");
        Ok(())
    }

    // -- Moderation ----------------------------------------------------------

    /// Ban `user`. Superusers only.
    pub fn ban_user(&self, requester: UserId, user: UserId) -> Result<()> {
        self.set_banned(requester, user, true)
    }

    /// Lift a ban. Superusers only.
    pub fn unban_user(&self, requester: UserId, user: UserId) -> Result<()> {
        self.set_banned(requester, user, false)
    }

    fn set_banned(&self, requester: UserId, user: UserId, banned: bool) -> Result<()> {
        self.check_not_banned(requester)?;
        self.check_superuser(requester)?;
        self.directory.set_banned(user, banned);
        info!(requester, user, banned, "ban changed on request");
        Ok(())
    }

    // -- Voting --------------------------------------------------------------

    pub fn vote_up(&self, user: UserId, id: TrackId) -> Result<()> {
        self.vote(user, id, true)
    }

    pub fn vote_down(&self, user: UserId, id: TrackId) -> Result<()> {
        self.vote(user, id, false)
    }

    fn vote(&self, user: UserId, id: TrackId, up: bool) -> Result<()> {
        self.check_not_banned(user)?;
        let found = if up {
            self.queue.vote_up(user, id)
        } else {
            self.queue.vote_down(user, id)
        };
        self.directory.record_activity(user);
        if !found {
            return Err(SchedulerError::TrackNotFound(id));
        }
        debug!(user, track_id = id, up, "vote recorded");
        Ok(())
    }

    // -- Queue management ----------------------------------------------------

    /// Remove a queued track. Returns its global position before removal.
    pub fn delete_track(&self, requester: UserId, id: TrackId) -> Result<usize> {
        self.check_not_banned(requester)?;
        if !self.directory.is_superuser(requester) {
            let track = self
                .queue
                .find_track(id)
                .ok_or(SchedulerError::TrackNotFound(id))?;
            self.check_owner(requester, &track)?;
        }
        self.queue
            .remove_track(id)
            .ok_or(SchedulerError::TrackNotFound(id))
    }

    pub fn raise_track(&self, requester: UserId, id: TrackId) -> Result<()> {
        self.check_not_banned(requester)?;
        let track = self
            .queue
            .find_track(id)
            .ok_or(SchedulerError::TrackNotFound(id))?;
        self.check_owner(requester, &track)?;
        if self.queue.raise_track(id) {
            Ok(())
        } else {
            Err(SchedulerError::TrackNotFound(id))
        }
    }

    /// Move `submitter` to the front of the order. Superusers only.
    ///
    /// Returns whether the submitter was in the order.
    pub fn raise_submitter(&self, requester: UserId, submitter: SubmitterId) -> Result<bool> {
        self.check_not_banned(requester)?;
        self.check_superuser(requester)?;
        Ok(self.queue.raise_submitter(submitter))
    }

    // -- Views ---------------------------------------------------------------

    /// Playback state. Without a `viewer` nothing is reported as owned
    /// and `superuser` is false.
    pub fn state(&self, viewer: Option<UserId>) -> StateView {
        let (current, elapsed_sec) = match self.now_playing().as_ref() {
            Some(np) => (Some(np.track.clone()), Some(np.started.elapsed().as_secs())),
            None => (None, None),
        };
        let own_tracks: BTreeMap<usize, Track> = match viewer {
            Some(user) => self
                .queue
                .user_tracks(SubmitterId::User(user))
                .into_iter()
                .filter_map(|t| {
                    let global = self.queue.track_position(&t)?.global?;
                    Some((global, t))
                })
                .collect(),
            None => BTreeMap::new(),
        };

        StateView {
            queue_len: self.queue.queue_len(),
            current,
            elapsed_sec,
            upcoming: self.queue.peek_next(),
            own_tracks,
            superuser: self.is_superuser_viewer(viewer),
        }
    }

    fn is_superuser_viewer(&self, viewer: Option<UserId>) -> bool {
        viewer.is_some_and(|u| self.directory.is_superuser(u))
    }

    pub fn queue_view(&self, viewer: Option<UserId>, offset: usize, limit: usize) -> QueueView {
        let users_cnt = self.queue.queue_len();
        let list = self.queue.queue_tracks(offset, limit);
        let first_tracks = if users_cnt == 0 {
            Vec::new()
        } else {
            self.queue.queue_tracks(0, users_cnt)
        };
        let is_own_tracks =
            viewer.is_some() && list.iter().any(|t| t.submitter.user() == viewer);

        QueueView {
            first_tracks,
            list,
            users_cnt,
            tracks_cnt: self.queue.tracks_queue_len(),
            is_own_tracks,
        }
    }

    /// Details of a queued track, or of the one playing now.
    pub fn track_info(&self, viewer: Option<UserId>, id: TrackId) -> Result<TrackInfo> {
        let track = self
            .queue
            .find_track(id)
            .or_else(|| self.queue.all_tracks().into_iter().find(|t| t.id == id))
            .or_else(|| self.current().filter(|t| t.id == id))
            .ok_or(SchedulerError::TrackNotFound(id))?;
        let position = self.queue.track_position(&track);

        Ok(TrackInfo {
            hated: viewer.is_some_and(|u| track.is_hated_by(u)),
            position,
            superuser: self.is_superuser_viewer(viewer),
            track,
        })
    }

    pub fn stats(&self) -> Stats {
        Stats {
            queue_len: self.queue.queue_len(),
            tracks_queued: self.queue.tracks_queue_len(),
            tracks_total: self.queue.all_tracks().len(),
            backlog_len: self.queue.backlog_len(),
            backlog_played: self.queue.backlog_played_len(),
        }
    }

    // -- Shutdown ------------------------------------------------------------

    /// Put the current track back in front and write the snapshot.
    pub fn shutdown(&self) -> std::result::Result<(), SnapshotError> {
        if let Some(np) = self.now_playing().take() {
            info!(track_id = np.track.id, "re-queueing current track before shutdown");
            self.queue.requeue_front(np.track);
        }
        self.playback.stop();
        self.store.save(&self.queue.snapshot()).map_err(|e| {
            tracing::error!(path = %self.store.path().display(), error = %e, "failed to save queue");
            e
        })
    }
}

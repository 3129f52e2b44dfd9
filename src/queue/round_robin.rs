//! Fair interleaving of per-submitter playlists.
//!
//! Every submitter owns a FIFO playlist. Submitters who joined the round-robin
//! order take turns: the one at the front plays their head track and moves to
//! the back of the order, or drops out if nothing is left. When nobody in the
//! order has a playable track, the [`Backlog`] fills the gap.
//!
//! All state sits behind one mutex held for the whole of each public call.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::backlog::{Backlog, BacklogEntry};
use super::media::MediaProbe;
use super::track::{SubmitterId, Track, TrackId, UserId};
use crate::snapshot::{PlaylistRecord, Snapshot};

/// Where a track sits in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TrackPosition {
    /// 1-based index inside the submitter's own playlist.
    pub local: usize,
    /// 1-based round-robin slot across all in-order submitters, or `None`
    /// when the submitter is not currently in the order.
    pub global: Option<usize>,
}

struct QueueInner {
    last_id: TrackId,
    playlists: BTreeMap<SubmitterId, VecDeque<Track>>,
    order: Vec<SubmitterId>,
    backlog: Backlog,
}

impl QueueInner {
    fn playlist_len(&self, submitter: &SubmitterId) -> usize {
        self.playlists.get(submitter).map_or(0, VecDeque::len)
    }

    fn order_index(&self, submitter: SubmitterId) -> Option<usize> {
        self.order.iter().position(|s| *s == submitter)
    }

    /// Locate a track among the playlists of in-order submitters.
    fn locate_in_order(&self, id: TrackId) -> Option<(SubmitterId, usize)> {
        self.order.iter().find_map(|s| {
            self.playlists
                .get(s)
                .and_then(|p| p.iter().position(|t| t.id == id))
                .map(|idx| (*s, idx))
        })
    }

    fn find_any_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.playlists
            .values_mut()
            .flat_map(|p| p.iter_mut())
            .find(|t| t.id == id)
    }

    /// Round-robin slot of the `local`-th track (1-based) of `submitter`.
    ///
    /// Everyone in the order contributes the tracks they play in earlier
    /// rounds, then the in-order submitters up to and including `submitter`
    /// who still have a track in round `local` play before or at this slot.
    fn global_position(&self, submitter: SubmitterId, local: usize) -> Option<usize> {
        let at = self.order_index(submitter)?;
        let earlier_rounds: usize = self
            .order
            .iter()
            .map(|s| self.playlist_len(s).min(local - 1))
            .sum();
        let this_round = self.order[..=at]
            .iter()
            .filter(|s| self.playlist_len(s) >= local)
            .count();
        Some(earlier_rounds + this_round)
    }

    fn next_id(&mut self) -> TrackId {
        self.last_id += 1;
        self.last_id
    }
}

pub struct RoundRobinQueue {
    inner: Mutex<QueueInner>,
    probe: Arc<dyn MediaProbe>,
}

impl RoundRobinQueue {
    pub fn new(probe: Arc<dyn MediaProbe>) -> Self {
        let mut playlists = BTreeMap::new();
        playlists.insert(SubmitterId::CommunityPool, VecDeque::new());
        Self {
            inner: Mutex::new(QueueInner {
                last_id: 0,
                playlists,
                order: Vec::new(),
                backlog: Backlog::new(),
            }),
            probe,
        }
    }

    /// Rebuild a queue from a saved snapshot.
    ///
    /// The id counter resumes after the larger of the saved `lastId` and the
    /// highest track id found, so new tracks never collide with restored ones.
    pub fn from_snapshot(probe: Arc<dyn MediaProbe>, snapshot: Snapshot) -> Self {
        let queue = Self::new(probe);
        {
            let mut inner = queue.lock();
            let mut max_id = snapshot.last_id;
            for record in snapshot.playlists {
                if let Some(id) = record.tracks.iter().map(|t| t.id).max() {
                    max_id = max_id.max(id);
                }
                inner
                    .playlists
                    .entry(record.submitter_id)
                    .or_default()
                    .extend(record.tracks);
            }
            inner.last_id = max_id;

            let mut seen = HashSet::new();
            for submitter in snapshot.submitter_order {
                if seen.insert(submitter) {
                    inner.order.push(submitter);
                } else {
                    warn!(%submitter, "duplicate submitter in saved order, ignoring");
                }
            }
            info!(
                last_id = inner.last_id,
                submitters = inner.order.len(),
                "queue restored from snapshot"
            );
        }
        queue
    }

    /// Capture everything needed to resume after a restart.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            last_id: inner.last_id,
            submitter_order: inner.order.clone(),
            playlists: inner
                .playlists
                .iter()
                .map(|(submitter, tracks)| PlaylistRecord {
                    submitter_id: *submitter,
                    tracks: tracks.iter().cloned().collect(),
                })
                .collect(),
            backlog_already_played_media_refs: inner.backlog.played_media(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Backlog -------------------------------------------------------------

    /// Turn scanned fallback files into community tracks and shuffle them
    /// into the backlog.
    pub fn populate_backlog(&self, entries: Vec<BacklogEntry>, already_played: &HashSet<String>) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let tracks: Vec<Track> = entries
            .into_iter()
            .map(|e| {
                let id = inner.next_id();
                Track::new(id, e.media, e.title, e.artist, 0, SubmitterId::CommunityPool)
            })
            .collect();
        inner
            .backlog
            .populate(tracks, already_played, &mut rand::thread_rng());
    }

    // -- Tracks --------------------------------------------------------------

    /// Append a new track to `submitter`'s playlist.
    ///
    /// This does not put the submitter in the round-robin order; see
    /// [`RoundRobinQueue::enter_order`].
    pub fn add_track(
        &self,
        media: impl Into<String>,
        title: Option<String>,
        artist: Option<String>,
        duration_sec: u32,
        submitter: SubmitterId,
    ) -> Track {
        let mut inner = self.lock();
        let id = inner.next_id();
        let track = Track::new(id, media, title, artist, duration_sec, submitter);
        inner
            .playlists
            .entry(submitter)
            .or_default()
            .push_back(track.clone());
        debug!(track_id = id, %submitter, "track added");
        track
    }

    /// Remove a track belonging to an in-order submitter.
    ///
    /// Returns the track's global position before removal. A submitter whose
    /// playlist ends up empty leaves the order.
    pub fn remove_track(&self, id: TrackId) -> Option<usize> {
        let mut inner = self.lock();
        let Some((submitter, idx)) = inner.locate_in_order(id) else {
            warn!(track_id = id, "unable to remove track: not in the queue");
            return None;
        };
        let global = inner.global_position(submitter, idx + 1);

        let emptied = match inner.playlists.get_mut(&submitter) {
            Some(playlist) => {
                playlist.remove(idx);
                playlist.is_empty()
            }
            None => false,
        };
        if emptied {
            inner.order.retain(|s| *s != submitter);
        }
        info!(track_id = id, %submitter, ?global, "track removed from queue");
        global
    }

    /// Move a queued track to the head of its submitter's playlist.
    pub fn raise_track(&self, id: TrackId) -> bool {
        let mut inner = self.lock();
        let Some((submitter, idx)) = inner.locate_in_order(id) else {
            warn!(track_id = id, "unable to raise track: not in the queue");
            return false;
        };
        if let Some(playlist) = inner.playlists.get_mut(&submitter) {
            if let Some(track) = playlist.remove(idx) {
                playlist.push_front(track);
            }
        }
        true
    }

    /// Put `track` back at the head of its submitter's playlist and move the
    /// submitter to the front of the order, so it plays next.
    ///
    /// Returns the resulting playlist length.
    pub fn requeue_front(&self, track: Track) -> usize {
        let mut inner = self.lock();
        let submitter = track.submitter;
        let playlist = inner.playlists.entry(submitter).or_default();
        playlist.retain(|t| t.id != track.id);
        playlist.push_front(track);
        let len = playlist.len();

        inner.order.retain(|s| *s != submitter);
        inner.order.insert(0, submitter);
        len
    }

    /// Downvote: add `user` to the track's haters. Searches every playlist.
    pub fn vote_down(&self, user: UserId, id: TrackId) -> bool {
        let mut inner = self.lock();
        match inner.find_any_mut(id) {
            Some(track) => {
                track.haters.insert(user);
                true
            }
            None => {
                warn!(track_id = id, "unable to find track in the playlists");
                false
            }
        }
    }

    /// Take back a downvote. Searches every playlist.
    pub fn vote_up(&self, user: UserId, id: TrackId) -> bool {
        let mut inner = self.lock();
        match inner.find_any_mut(id) {
            Some(track) => {
                track.haters.remove(&user);
                true
            }
            None => {
                warn!(track_id = id, "unable to find track in the playlists");
                false
            }
        }
    }

    // -- Order ---------------------------------------------------------------

    /// Join the round-robin order.
    ///
    /// Returns the 1-based position (the existing one if already queued), or
    /// `None` when the submitter has nothing to play.
    pub fn enter_order(&self, submitter: SubmitterId) -> Option<usize> {
        let mut inner = self.lock();
        if let Some(idx) = inner.order_index(submitter) {
            return Some(idx + 1);
        }
        if inner.playlist_len(&submitter) == 0 {
            warn!(%submitter, "submitter can't enter the queue with an empty playlist");
            return None;
        }
        inner.order.push(submitter);
        Some(inner.order.len())
    }

    /// Leave the order. Returns the former 1-based position.
    pub fn leave_order(&self, submitter: SubmitterId) -> Option<usize> {
        let mut inner = self.lock();
        match inner.order_index(submitter) {
            Some(idx) => {
                inner.order.remove(idx);
                Some(idx + 1)
            }
            None => {
                warn!(%submitter, "unable to remove submitter from the queue");
                None
            }
        }
    }

    /// Move a submitter to the front of the order.
    pub fn raise_submitter(&self, submitter: SubmitterId) -> bool {
        let mut inner = self.lock();
        match inner.order_index(submitter) {
            Some(idx) => {
                let s = inner.order.remove(idx);
                inner.order.insert(0, s);
                true
            }
            None => {
                warn!(%submitter, "unable to raise submitter in the queue");
                false
            }
        }
    }

    pub fn is_in_order(&self, submitter: SubmitterId) -> bool {
        self.lock().order_index(submitter).is_some()
    }

    // -- Scheduling ----------------------------------------------------------

    /// Take the next track to play.
    ///
    /// The first in-order submitter with a track plays its head and rotates to
    /// the back of the order (or leaves it when nothing remains). Tracks whose
    /// media has vanished are discarded and the search continues. With nothing
    /// playable in the order, the backlog is used.
    pub fn pop_next(&self) -> Option<Track> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        loop {
            let playlists = &inner.playlists;
            let before = inner.order.len();
            inner
                .order
                .retain(|s| playlists.get(s).is_some_and(|p| !p.is_empty()));
            if inner.order.len() != before {
                debug!(pruned = before - inner.order.len(), "pruned empty submitters from order");
            }
            if inner.order.is_empty() {
                break;
            }

            let submitter = inner.order.remove(0);
            let Some(playlist) = inner.playlists.get_mut(&submitter) else {
                continue;
            };
            let Some(track) = playlist.pop_front() else {
                continue;
            };
            if !playlist.is_empty() {
                inner.order.push(submitter);
            }

            if !self.probe.is_playable(&track.media) {
                warn!(track_id = track.id, title = %track.full_title(), "media does not exist for track");
                continue;
            }
            info!(track_id = track.id, %submitter, title = %track.full_title(), "playing track from main queue");
            return Some(track);
        }

        let track = inner
            .backlog
            .pop_playable(self.probe.as_ref(), &mut rand::thread_rng())?;
        info!(track_id = track.id, title = %track.full_title(), "playing track from fallback playlist");
        Some(track)
    }

    /// What [`RoundRobinQueue::pop_next`] would most likely return, without
    /// consuming anything.
    pub fn peek_next(&self) -> Option<Track> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .find_map(|s| inner.playlists.get(s).and_then(|p| p.front()))
            .or_else(|| inner.backlog.peek())
            .cloned()
    }

    // -- Queries -------------------------------------------------------------

    /// Local and global position of `track`, or `None` if it is no longer
    /// in its submitter's playlist.
    pub fn track_position(&self, track: &Track) -> Option<TrackPosition> {
        let inner = self.lock();
        let idx = inner
            .playlists
            .get(&track.submitter)?
            .iter()
            .position(|t| t.id == track.id)?;
        let local = idx + 1;
        Some(TrackPosition {
            local,
            global: inner.global_position(track.submitter, local),
        })
    }

    /// Simulated play-out order across all in-order submitters: everyone's
    /// first track, then everyone's second, and so on.
    ///
    /// `limit == 0` means unbounded.
    pub fn queue_tracks(&self, offset: usize, limit: usize) -> Vec<Track> {
        let inner = self.lock();
        let lists: Vec<&VecDeque<Track>> = inner
            .order
            .iter()
            .filter_map(|s| inner.playlists.get(s))
            .collect();
        let rounds = lists.iter().map(|p| p.len()).max().unwrap_or(0);

        let lists = &lists;
        let all = (0..rounds).flat_map(move |round| lists.iter().filter_map(move |p| p.get(round)));
        let page = all.skip(offset);
        if limit == 0 {
            page.cloned().collect()
        } else {
            page.take(limit).cloned().collect()
        }
    }

    /// Track with `id` among in-order submitters' playlists.
    pub fn find_track(&self, id: TrackId) -> Option<Track> {
        let inner = self.lock();
        let (submitter, idx) = inner.locate_in_order(id)?;
        inner.playlists.get(&submitter)?.get(idx).cloned()
    }

    pub fn user_tracks(&self, submitter: SubmitterId) -> Vec<Track> {
        self.lock()
            .playlists
            .get(&submitter)
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every track in every playlist, in or out of the order.
    pub fn all_tracks(&self) -> Vec<Track> {
        self.lock()
            .playlists
            .values()
            .flat_map(|p| p.iter().cloned())
            .collect()
    }

    /// Number of submitters in the order.
    pub fn queue_len(&self) -> usize {
        self.lock().order.len()
    }

    /// Tracks queued by in-order submitters.
    pub fn tracks_queue_len(&self) -> usize {
        let inner = self.lock();
        inner.order.iter().map(|s| inner.playlist_len(s)).sum()
    }

    pub fn backlog_len(&self) -> usize {
        self.lock().backlog.len()
    }

    pub fn backlog_played_len(&self) -> usize {
        self.lock().backlog.played_len()
    }

    pub fn last_id(&self) -> TrackId {
        self.lock().last_id
    }
}

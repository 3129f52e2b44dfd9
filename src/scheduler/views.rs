//! Read-only views returned by the scheduler facade and served by the API.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::queue::{Track, TrackPosition};

/// Result of one `advance` step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Advance {
    pub playing: Option<Track>,
    pub upcoming: Option<Track>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    /// Submitters currently in the round-robin order.
    pub queue_len: usize,
    pub current: Option<Track>,
    /// Seconds since the current track started.
    pub elapsed_sec: Option<u64>,
    pub upcoming: Option<Track>,
    /// Viewer's queued tracks keyed by global position.
    pub own_tracks: BTreeMap<usize, Track>,
    pub superuser: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueView {
    /// Everyone's next track, in order.
    pub first_tracks: Vec<Track>,
    /// Requested page of the simulated play-out order.
    pub list: Vec<Track>,
    pub users_cnt: usize,
    pub tracks_cnt: usize,
    /// Whether the viewer owns any track in `list`.
    pub is_own_tracks: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub track: Track,
    pub hated: bool,
    pub position: Option<TrackPosition>,
    pub superuser: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub queue_len: usize,
    pub tracks_queued: usize,
    pub tracks_total: usize,
    pub backlog_len: usize,
    pub backlog_played: usize,
}

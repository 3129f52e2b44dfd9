//! The queue engine: tracks, per-submitter playlists, the round-robin order,
//! and the fallback backlog.

pub mod backlog;
pub mod media;
pub mod round_robin;
pub mod track;

pub use self::backlog::{scan_dir, Backlog, BacklogEntry};
pub use self::media::{FsMediaProbe, MediaProbe};
pub use self::round_robin::{RoundRobinQueue, TrackPosition};
pub use self::track::{SubmitterId, Track, TrackId, UserId, COMMUNITY_POOL_ID};

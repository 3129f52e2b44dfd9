//! Queued track entity and submitter identity.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Process-unique track identifier.
pub type TrackId = u64;

/// Identifier of a listener (voter, requester, submitter).
pub type UserId = i64;

/// Reserved integer under which community-pool tracks are stored.
pub const COMMUNITY_POOL_ID: UserId = -1;

// ---------------------------------------------------------------------------
// SubmitterId
// ---------------------------------------------------------------------------

/// Who a track is attributed to.
///
/// Serialised as a plain integer, with [`COMMUNITY_POOL_ID`] standing for the
/// pool so that snapshots stay compatible with integer-keyed tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum SubmitterId {
    /// A real listener.
    User(UserId),
    /// Tracks not attributable to a listener (fallback media, admin picks).
    CommunityPool,
}

impl SubmitterId {
    /// The listener behind this submitter, if there is one.
    pub fn user(self) -> Option<UserId> {
        match self {
            SubmitterId::User(id) => Some(id),
            SubmitterId::CommunityPool => None,
        }
    }
}

impl From<i64> for SubmitterId {
    fn from(raw: i64) -> Self {
        if raw == COMMUNITY_POOL_ID {
            SubmitterId::CommunityPool
        } else {
            SubmitterId::User(raw)
        }
    }
}

impl From<SubmitterId> for i64 {
    fn from(id: SubmitterId) -> Self {
        match id {
            SubmitterId::User(raw) => raw,
            SubmitterId::CommunityPool => COMMUNITY_POOL_ID,
        }
    }
}

impl fmt::Display for SubmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitterId::User(id) => write!(f, "user#{}", id),
            SubmitterId::CommunityPool => write!(f, "community"),
        }
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// One queued song.
///
/// The scheduler only stores `media` as a locator; the file itself belongs to
/// whoever downloaded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub media: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    #[serde(rename = "duration")]
    pub duration_sec: u32,
    #[serde(rename = "submitterId")]
    pub submitter: SubmitterId,
    #[serde(default)]
    pub haters: BTreeSet<UserId>,
}

impl Track {
    pub fn new(
        id: TrackId,
        media: impl Into<String>,
        title: Option<String>,
        artist: Option<String>,
        duration_sec: u32,
        submitter: SubmitterId,
    ) -> Self {
        Self {
            id,
            media: media.into(),
            title,
            artist,
            duration_sec,
            submitter,
            haters: BTreeSet::new(),
        }
    }

    /// Display name shown to listeners and used in log lines.
    ///
    /// `artist — title` when both are known, whichever one is known otherwise,
    /// and the media file stem as a last resort.
    pub fn full_title(&self) -> String {
        let artist = non_empty(self.artist.as_deref());
        let title = non_empty(self.title.as_deref());
        match (artist, title) {
            (Some(artist), Some(title)) => format!("{} — {}", artist, title),
            (Some(artist), None) => artist.to_string(),
            (None, Some(title)) => title.to_string(),
            (None, None) => Path::new(&self.media)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Whether `user` has downvoted this track.
    pub fn is_hated_by(&self, user: UserId) -> bool {
        self.haters.contains(&user)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

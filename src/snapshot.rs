//! Flat-file persistence of the queue for crash recovery.
//!
//! The snapshot is one pretty-printed JSON document:
//!
//! ```json
//! {
//!   "lastId": 12,
//!   "submitterOrder": [4, 9],
//!   "playlists": [{ "submitterId": 4, "tracks": [ ... ] }],
//!   "backlogAlreadyPlayedMediaRefs": ["/media/fallback/a.mp3"]
//! }
//! ```
//!
//! A missing or unreadable snapshot is never fatal: the scheduler starts
//! empty instead.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SnapshotError;
use crate::queue::{SubmitterId, Track, TrackId};

/// On-disk track layout: `{id, title, artist, duration, submitterId, media, haters}`.
pub type TrackRecord = Track;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRecord {
    pub submitter_id: SubmitterId,
    pub tracks: Vec<TrackRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub last_id: TrackId,
    #[serde(default)]
    pub submitter_order: Vec<SubmitterId>,
    #[serde(default)]
    pub playlists: Vec<PlaylistRecord>,
    #[serde(default)]
    pub backlog_already_played_media_refs: Vec<String>,
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot, surfacing every failure.
    pub fn read(&self) -> Result<Snapshot, SnapshotError> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read the snapshot, treating a missing or malformed file as empty.
    pub fn load(&self) -> Snapshot {
        match self.read() {
            Ok(snapshot) => {
                info!(path = %self.path.display(), last_id = snapshot.last_id, "snapshot loaded");
                snapshot
            }
            Err(SnapshotError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot found, starting empty");
                Snapshot::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot unusable, starting empty");
                Snapshot::default()
            }
        }
    }

    /// Write the snapshot, replacing the previous one atomically.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        info!(path = %self.path.display(), "queue has been saved");
        Ok(())
    }
}

//! Fallback playlist played when no submitter has anything queued.
//!
//! The backlog is a shuffled pool of tracks from a local media directory plus
//! a history of what has already been played. Played tracks are recycled into
//! the pool once the history grows as large as what is left, so the pool
//! never runs dry while at least one file stays playable.

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use super::media::MediaProbe;
use super::track::Track;

// ---------------------------------------------------------------------------
// Directory scan
// ---------------------------------------------------------------------------

/// A playable file discovered in the fallback directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogEntry {
    pub media: String,
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// List fallback media in `dir`, skipping dot-files and foreign extensions.
///
/// A stem shaped like `Artist - Title` fills in both fields; anything else
/// leaves them empty so the display name falls back to the file stem.
pub fn scan_dir(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<BacklogEntry>> {
    let mut entries = Vec::new();
    for dirent in std::fs::read_dir(dir)? {
        let path = dirent?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let accepted = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)));
        if !accepted {
            debug!(file = %name, "skipping fallback file with unsupported extension");
            continue;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (artist, title) = split_stem(&stem);
        entries.push(BacklogEntry {
            media: path.to_string_lossy().into_owned(),
            title,
            artist,
        });
    }
    Ok(entries)
}

fn split_stem(stem: &str) -> (Option<String>, Option<String>) {
    match stem.split_once(" - ") {
        Some((artist, title)) if !artist.trim().is_empty() && !title.trim().is_empty() => (
            Some(artist.trim().to_string()),
            Some(title.trim().to_string()),
        ),
        _ => (None, None),
    }
}

// ---------------------------------------------------------------------------
// Backlog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Backlog {
    pool: VecDeque<Track>,
    played: Vec<Track>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the pool with `tracks`.
    ///
    /// Tracks whose media appears in `already_played` go after the fresh ones;
    /// each group is shuffled on its own.
    pub fn populate<R: Rng + ?Sized>(
        &mut self,
        tracks: Vec<Track>,
        already_played: &HashSet<String>,
        rng: &mut R,
    ) {
        let (mut stale, mut fresh): (Vec<Track>, Vec<Track>) = tracks
            .into_iter()
            .partition(|t| already_played.contains(&t.media));
        fresh.shuffle(rng);
        stale.shuffle(rng);
        self.pool.extend(fresh);
        self.pool.extend(stale);
        info!(len = self.pool.len(), "fallback playlist populated");
    }

    /// Take the next playable track, dropping any whose media is gone.
    pub fn pop_playable<R: Rng + ?Sized>(
        &mut self,
        probe: &dyn MediaProbe,
        rng: &mut R,
    ) -> Option<Track> {
        while let Some(track) = self.pool.pop_front() {
            if !probe.is_playable(&track.media) {
                warn!(title = %track.full_title(), media = %track.media, "media does not exist for fallback track");
                continue;
            }

            self.played.push(track.clone());
            if self.pool.len() <= self.played.len() {
                let i = rng.gen_range(0..self.played.len());
                let recycled = self.played.remove(i);
                debug!(title = %recycled.full_title(), "recycling played fallback track");
                self.pool.push_back(recycled);
            }
            return Some(track);
        }
        None
    }

    pub fn peek(&self) -> Option<&Track> {
        self.pool.front()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn played_len(&self) -> usize {
        self.played.len()
    }

    /// Media references of the played history, oldest first.
    pub fn played_media(&self) -> Vec<String> {
        self.played.iter().map(|t| t.media.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::track::SubmitterId;

    struct Always;
    impl MediaProbe for Always {
        fn is_playable(&self, _media: &str) -> bool {
            true
        }
    }

    struct Only(&'static str);
    impl MediaProbe for Only {
        fn is_playable(&self, media: &str) -> bool {
            media == self.0
        }
    }

    fn pool_track(id: u64, media: &str) -> Track {
        Track::new(id, media, None, None, 0, SubmitterId::CommunityPool)
    }

    #[test]
    fn test_populate_puts_already_played_last() {
        let mut backlog = Backlog::new();
        let played: HashSet<String> = ["b.mp3".to_string()].into_iter().collect();
        backlog.populate(
            vec![pool_track(1, "a.mp3"), pool_track(2, "b.mp3"), pool_track(3, "c.mp3")],
            &played,
            &mut rand::thread_rng(),
        );
        assert_eq!(backlog.len(), 3);
        assert_eq!(backlog.pool.back().unwrap().media, "b.mp3");
    }

    #[test]
    fn test_pop_recycles_when_history_catches_up() {
        let mut backlog = Backlog::new();
        backlog.populate(
            vec![pool_track(1, "a.mp3"), pool_track(2, "b.mp3")],
            &HashSet::new(),
            &mut rand::thread_rng(),
        );
        let mut rng = rand::thread_rng();

        // 2 in pool -> pop leaves 1 in pool and 1 played: recycle kicks in.
        assert!(backlog.pop_playable(&Always, &mut rng).is_some());
        assert_eq!(backlog.len() + backlog.played_len(), 2);
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog.played_len(), 0);

        for _ in 0..10 {
            assert!(backlog.pop_playable(&Always, &mut rng).is_some());
        }
        assert_eq!(backlog.len() + backlog.played_len(), 2);
    }

    #[test]
    fn test_pop_skips_missing_media() {
        let mut backlog = Backlog::new();
        backlog.pool.push_back(pool_track(1, "gone.mp3"));
        backlog.pool.push_back(pool_track(2, "here.mp3"));

        let track = backlog
            .pop_playable(&Only("here.mp3"), &mut rand::thread_rng())
            .unwrap();
        assert_eq!(track.id, 2);
        // The missing one is gone for good, the played one came back.
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog.peek().unwrap().media, "here.mp3");
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let mut backlog = Backlog::new();
        assert!(backlog.pop_playable(&Always, &mut rand::thread_rng()).is_none());
    }

    #[test]
    fn test_scan_dir_filters_and_parses_names() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("Band - Song.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("untitled.ogg"), b"x").unwrap();
        std::fs::write(dir.path().join(".hidden.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested.mp3")).unwrap();

        let exts = vec!["mp3".to_string(), "ogg".to_string()];
        let mut entries = scan_dir(dir.path(), &exts).unwrap();
        entries.sort_by(|a, b| a.media.cmp(&b.media));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].artist.as_deref(), Some("Band"));
        assert_eq!(entries[0].title.as_deref(), Some("Song"));
        assert_eq!(entries[1].artist, None);
        assert_eq!(entries[1].title, None);
    }
}

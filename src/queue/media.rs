//! Liveness checks for media references.

use std::path::Path;

/// Decides whether a track's media can still be handed to playback.
pub trait MediaProbe: Send + Sync {
    fn is_playable(&self, media: &str) -> bool;
}

/// Treats a media reference as a local file path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMediaProbe;

impl MediaProbe for FsMediaProbe {
    fn is_playable(&self, media: &str) -> bool {
        Path::new(media).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_probe_detects_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"ID3").unwrap();

        let probe = FsMediaProbe;
        assert!(probe.is_playable(path.to_str().unwrap()));
        assert!(!probe.is_playable(dir.path().join("gone.mp3").to_str().unwrap()));
        assert!(!probe.is_playable(dir.path().to_str().unwrap()));
    }
}

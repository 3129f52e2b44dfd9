//! Error types for the scheduler and its snapshot store.

use crate::queue::{TrackId, UserId};

/// Failures of the on-disk snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Refusals returned by requester-scoped scheduler operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("user #{0} is not allowed to do that")]
    PermissionDenied(UserId),

    #[error("user #{0} is banned")]
    Banned(UserId),

    #[error("user #{0} has reached the request limit")]
    QuotaReached(UserId),

    #[error("track #{0} not found")]
    TrackNotFound(TrackId),

    #[error("nothing is playing")]
    NothingPlaying,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::error::SchedulerError;
use crate::queue::{SubmitterId, TrackId, UserId};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/now-playing", get(now_playing))
        .route("/queue", get(queue))
        .route("/stats", get(stats))
        .route("/tracks", post(submit_track))
        .route("/tracks/{id}", get(track_info).delete(delete_track))
        .route("/tracks/{id}/vote", post(vote))
        .route("/skip", post(skip))
        .route("/users/{id}/ban", post(ban_user).delete(unban_user))
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            SchedulerError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "permission_denied"),
            SchedulerError::Banned(_) => (StatusCode::FORBIDDEN, "banned"),
            SchedulerError::QuotaReached(_) => (StatusCode::TOO_MANY_REQUESTS, "quota_reached"),
            SchedulerError::TrackNotFound(_) => (StatusCode::NOT_FOUND, "track_not_found"),
            SchedulerError::NothingPlaying => (StatusCode::NOT_FOUND, "nothing_playing"),
        };
        let body = json!({ "error": { "code": code, "message": self.to_string() } });
        (status, Json(body)).into_response()
    }
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

#[derive(Debug, Deserialize)]
struct ViewerQuery {
    #[serde(default)]
    viewer: Option<UserId>,
}

async fn now_playing(State(state): State<AppState>, Query(q): Query<ViewerQuery>) -> Json<Value> {
    let view = state.scheduler.state(q.viewer);
    Json(json!({ "data": view, "meta": meta() }))
}

#[derive(Debug, Deserialize)]
struct QueueQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    limit: usize,
    #[serde(default)]
    viewer: Option<UserId>,
}

async fn queue(State(state): State<AppState>, Query(q): Query<QueueQuery>) -> Json<Value> {
    let view = state.scheduler.queue_view(q.viewer, q.offset, q.limit);
    Json(json!({ "data": view, "meta": meta() }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.scheduler.stats(), "meta": meta() }))
}

async fn track_info(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
    Query(q): Query<ViewerQuery>,
) -> Result<Json<Value>, SchedulerError> {
    let info = state.scheduler.track_info(q.viewer, id)?;
    Ok(Json(json!({ "data": info, "meta": meta() })))
}

/// Hand-off from the download layer.
#[derive(Debug, Deserialize)]
struct SubmitRequest {
    media: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    duration: u32,
    /// Absent for community-pool tracks.
    #[serde(default)]
    user_id: Option<UserId>,
}

async fn submit_track(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Value>), SchedulerError> {
    let submitter = req
        .user_id
        .map_or(SubmitterId::CommunityPool, SubmitterId::from);
    let (track, position) = state.scheduler.submit_track(
        req.media,
        req.title,
        req.artist,
        req.duration,
        submitter,
    )?;
    let remaining_requests = req
        .user_id
        .and_then(|user| state.scheduler.remaining_requests(user));
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "data": {
                "track": track,
                "position": position,
                "remaining_requests": remaining_requests
            },
            "meta": meta()
        })),
    ))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VoteDirection {
    Up,
    Down,
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    user_id: UserId,
    direction: VoteDirection,
}

async fn vote(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<Value>, SchedulerError> {
    match req.direction {
        VoteDirection::Up => state.scheduler.vote_up(req.user_id, id)?,
        VoteDirection::Down => state.scheduler.vote_down(req.user_id, id)?,
    }
    Ok(Json(json!({ "data": { "track_id": id }, "meta": meta() })))
}

#[derive(Debug, Deserialize)]
struct RequesterQuery {
    user_id: UserId,
}

async fn delete_track(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
    Query(q): Query<RequesterQuery>,
) -> Result<Json<Value>, SchedulerError> {
    let position = state.scheduler.delete_track(q.user_id, id)?;
    Ok(Json(json!({ "data": { "position": position }, "meta": meta() })))
}

#[derive(Debug, Deserialize)]
struct SkipRequest {
    user_id: UserId,
}

async fn skip(
    State(state): State<AppState>,
    Json(req): Json<SkipRequest>,
) -> Result<Json<Value>, SchedulerError> {
    let step = state.scheduler.skip(req.user_id)?;
    Ok(Json(json!({ "data": step, "meta": meta() })))
}

async fn ban_user(
    State(state): State<AppState>,
    Path(user): Path<UserId>,
    Query(q): Query<RequesterQuery>,
) -> Result<Json<Value>, SchedulerError> {
    state.scheduler.ban_user(q.user_id, user)?;
    Ok(Json(json!({ "data": { "user_id": user, "banned": true }, "meta": meta() })))
}

async fn unban_user(
    State(state): State<AppState>,
    Path(user): Path<UserId>,
    Query(q): Query<RequesterQuery>,
) -> Result<Json<Value>, SchedulerError> {
    state.scheduler.unban_user(q.user_id, user)?;
    Ok(Json(json!({ "data": { "user_id": user, "banned": false }, "meta": meta() })))
}

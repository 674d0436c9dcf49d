//! HTTP request handlers
//!
//! The REST control surface: configuration, delay, live-run and fragment
//! lifecycle, the caption export, and the derived playlists.

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::SubtitleError;
use crate::messages::AdminStatusPayload;
use crate::session::engine::SlotExport;
use crate::session::types::{SessionMode, SessionSettings};
use crate::state::AppState;

/// HTTP error type
#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": reason })),
            )
                .into_response(),
            HttpError::NotFound(reason) => (StatusCode::NOT_FOUND, reason).into_response(),
            HttpError::Internal(reason) => {
                (StatusCode::INTERNAL_SERVER_ERROR, reason).into_response()
            }
        }
    }
}

// Malformed request bodies answer 400 with a reason, like every other
// request-boundary failure.
impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        HttpError::BadRequest(rejection.body_text())
    }
}

impl From<SubtitleError> for HttpError {
    fn from(err: SubtitleError) -> Self {
        match err {
            SubtitleError::NotEnoughSegments => HttpError::NotFound("not enough segments".into()),
            SubtitleError::PlaylistNotFound(_) => HttpError::NotFound(err.to_string()),
            SubtitleError::Io(_) => HttpError::Internal(err.to_string()),
            _ => HttpError::BadRequest(err.to_string()),
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> &'static str {
    concat!("subtitling-server v", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub delay_sec: u64,
    pub mode: SessionMode,
    pub fragment_mode: bool,
}

/// GET /config
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    let snapshot = state.engine.live_snapshot();
    Json(ConfigResponse {
        delay_sec: snapshot.delay_sec,
        mode: snapshot.mode,
        fragment_mode: snapshot.fragment_mode,
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayBody {
    pub delay_sec: u64,
}

/// GET /delay
pub async fn get_delay(State(state): State<Arc<AppState>>) -> Json<DelayBody> {
    Json(DelayBody {
        delay_sec: state.engine.settings().delay_sec,
    })
}

/// POST /delay
pub async fn set_delay(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DelayBody>, JsonRejection>,
) -> Result<Json<DelayBody>, HttpError> {
    let Json(body) = body?;
    let delay_sec = state
        .engine
        .set_delay(body.delay_sec, state.config.hls.max_delay_secs)?;
    Ok(Json(DelayBody { delay_sec }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatusResponse {
    pub running: bool,
    pub live_started_at: Option<u64>,
    pub manifest: bool,
    pub segment_count: usize,
    pub mode: SessionMode,
    pub delay_sec: u64,
    pub fragment_mode: bool,
    pub min_subtitlers: usize,
}

/// GET /live/status
pub async fn live_status(State(state): State<Arc<AppState>>) -> Json<LiveStatusResponse> {
    let snapshot = state.engine.live_snapshot();
    let playlist = state.playlists.status();
    Json(LiveStatusResponse {
        running: snapshot.running,
        live_started_at: snapshot.live_started_at_ms,
        manifest: playlist.has_manifest,
        segment_count: playlist.segment_count,
        mode: snapshot.mode,
        delay_sec: snapshot.delay_sec,
        fragment_mode: snapshot.fragment_mode,
        min_subtitlers: snapshot.min_subtitlers,
    })
}

/// Per-run overrides accepted by /live/start and /fragment/config
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsOverrides {
    pub delay_sec: Option<u64>,
    pub slot_duration: Option<u64>,
    pub overlap_duration: Option<u64>,
    pub notify_before: Option<u64>,
    pub grace_period_percent: Option<u64>,
    pub required_subtitlers: Option<usize>,
    pub segment_duration: Option<u64>,
}

impl SettingsOverrides {
    fn apply(&self, mut settings: SessionSettings) -> SessionSettings {
        if let Some(value) = self.delay_sec {
            settings.delay_sec = value;
        }
        if let Some(value) = self.slot_duration {
            settings.slot_duration = value;
        }
        if let Some(value) = self.overlap_duration {
            settings.overlap_duration = value;
        }
        if let Some(value) = self.notify_before {
            settings.notify_before = value;
        }
        if let Some(value) = self.grace_period_percent {
            settings.grace_percent = value;
        }
        if let Some(value) = self.required_subtitlers {
            settings.required_subtitlers = value;
        }
        if let Some(value) = self.segment_duration {
            settings.segment_duration = value;
        }
        settings
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunBody {
    pub source: String,
    pub mode: Option<SessionMode>,
    #[serde(flatten)]
    pub overrides: SettingsOverrides,
}

#[derive(Debug, Serialize)]
pub struct StatusReply {
    pub status: &'static str,
}

/// POST /live/start
pub async fn live_start(
    State(state): State<Arc<AppState>>,
    body: Result<Json<StartRunBody>, JsonRejection>,
) -> Result<Json<StatusReply>, HttpError> {
    let Json(body) = body?;
    let settings = body.overrides.apply(state.engine.settings());
    let mode = body.mode.unwrap_or(SessionMode::Fragmentation);
    state
        .engine
        .start_live(Some(body.source), mode, settings)?;
    Ok(Json(StatusReply { status: "started" }))
}

/// POST /live/stop (idempotent)
pub async fn live_stop(State(state): State<Arc<AppState>>) -> Result<Json<StatusReply>, HttpError> {
    state.engine.stop_live()?;
    Ok(Json(StatusReply { status: "stopped" }))
}

/// GET /fragment/config
pub async fn fragment_config(State(state): State<Arc<AppState>>) -> Json<SessionSettings> {
    Json(state.engine.settings())
}

/// POST /fragment/config
pub async fn fragment_config_set(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SettingsOverrides>, JsonRejection>,
) -> Result<Json<SessionSettings>, HttpError> {
    let Json(body) = body?;
    let settings = body.apply(state.engine.settings());
    state.engine.update_settings(settings)?;
    Ok(Json(settings))
}

/// GET /fragment/status
pub async fn fragment_status(State(state): State<Arc<AppState>>) -> Json<AdminStatusPayload> {
    Json(state.engine.fragment_overview())
}

/// POST /fragment/start
pub async fn fragment_start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusReply>, HttpError> {
    state.engine.activate_fragments()?;
    Ok(Json(StatusReply { status: "started" }))
}

/// POST /fragment/stop
pub async fn fragment_stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusReply>, HttpError> {
    state.engine.deactivate_fragments()?;
    Ok(Json(StatusReply { status: "stopped" }))
}

/// GET /fragment/raw-captions
pub async fn raw_captions(State(state): State<Arc<AppState>>) -> Json<Vec<SlotExport>> {
    Json(state.engine.export_slots())
}

fn playlist_response(body: String) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Content-Type",
        HeaderValue::from_static("application/vnd.apple.mpegurl"),
    );
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    (headers, body).into_response()
}

/// GET /hls/live.m3u8
pub async fn live_playlist(State(state): State<Arc<AppState>>) -> Result<Response, HttpError> {
    let body = state.playlists.live_view()?;
    Ok(playlist_response(body))
}

/// GET /hls/delayed.m3u8
pub async fn delayed_playlist(State(state): State<Arc<AppState>>) -> Result<Response, HttpError> {
    let delay_sec = state.engine.settings().delay_sec;
    let body = state.playlists.delayed_view(delay_sec)?;
    Ok(playlist_response(body))
}

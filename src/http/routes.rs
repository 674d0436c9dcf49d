//! Axum router configuration

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{
    delayed_playlist, fragment_config, fragment_config_set, fragment_start, fragment_status,
    fragment_stop, get_config, get_delay, health_check, live_playlist, live_start, live_status,
    live_stop, raw_captions, set_delay, version_check,
};
use super::ws::ws_handler;

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // Media-player clients (spectator video elements) fetch playlists and
    // segments cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers([
            header::ACCEPT,
            header::RANGE,
            header::CONTENT_TYPE,
            header::ORIGIN,
        ])
        .max_age(Duration::from_secs(3600));

    let segment_dir = state.config.hls.segment_dir.clone();

    Router::new()
        // Health and version endpoints
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        // Realtime channel
        .route("/ws", get(ws_handler))
        // Configuration
        .route("/config", get(get_config))
        .route("/delay", get(get_delay).post(set_delay))
        // Live run lifecycle
        .route("/live/status", get(live_status))
        .route("/live/start", post(live_start))
        .route("/live/stop", post(live_stop))
        // Fragment engine
        .route(
            "/fragment/config",
            get(fragment_config).post(fragment_config_set),
        )
        .route("/fragment/status", get(fragment_status))
        .route("/fragment/start", post(fragment_start))
        .route("/fragment/stop", post(fragment_stop))
        .route("/fragment/raw-captions", get(raw_captions))
        // Derived playlists; everything else under /hls is a segment file
        // (nest_service strips the /hls prefix before ServeDir sees it)
        .route("/hls/live.m3u8", get(live_playlist))
        .route("/hls/delayed.m3u8", get(delayed_playlist))
        .nest_service("/hls", ServeDir::new(segment_dir))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // State
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(ServerConfig::default()))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_config_shape() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::get("/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["fragmentMode"], false);
        assert!(json["delaySec"].is_u64());
    }

    #[tokio::test]
    async fn test_delay_floor_rejected() {
        let app = create_router(test_state());
        // Defaults: D=15, g=20% -> minDelay = 18
        let response = app
            .oneshot(
                Request::post("/delay")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"delaySec":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("minDelay"));
    }

    #[tokio::test]
    async fn test_delay_roundtrip() {
        let state = test_state();
        let app = create_router(state.clone());
        let response = app
            .clone()
            .oneshot(
                Request::post("/delay")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"delaySec":45}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/delay").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["delaySec"], 45);
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::post("/delay")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_live_start_refused_without_subtitlers() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::post("/live/start")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"source":"talk.mp4"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"]
            .as_str()
            .unwrap()
            .contains("Not enough subtitlers"));
    }

    #[tokio::test]
    async fn test_live_stop_idempotent() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::post("/live/stop").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_fragment_config_validation() {
        let app = create_router(test_state());
        // Overlap >= slot duration is refused
        let response = app
            .clone()
            .oneshot(
                Request::post("/fragment/config")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"slotDuration":10,"overlapDuration":10}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // A consistent update is accepted and echoed back
        let response = app
            .oneshot(
                Request::post("/fragment/config")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"slotDuration":10,"overlapDuration":4,"gracePeriodPercent":0,
                            "requiredSubtitlers":2,"delaySec":30}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["slotDuration"], 10);
        assert_eq!(json["overlapDuration"], 4);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_404() {
        let app = create_router(test_state());
        for path in ["/hls/live.m3u8", "/hls/delayed.m3u8"] {
            let response = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "for {path}");
        }
    }

    #[tokio::test]
    async fn test_delayed_playlist_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n");
        for i in 0..30 {
            body.push_str(&format!("#EXTINF:2.0,\nseg{i:05}.ts\n"));
        }
        std::fs::write(dir.path().join("source.m3u8"), body).unwrap();

        let mut config = ServerConfig::default();
        config.hls.segment_dir = dir.path().to_path_buf();
        let app = create_router(Arc::new(AppState::new(config)));

        let response = app
            .clone()
            .oneshot(Request::get("/hls/live.m3u8").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/vnd.apple.mpegurl"
        );

        // Default delay 30s at 2s segments shifts the edge back 15 segments.
        let response = app
            .oneshot(
                Request::get("/hls/delayed.m3u8")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("seg00014.ts"));
        assert!(!text.contains("seg00015.ts"));
    }

    #[tokio::test]
    async fn test_fragment_status_shape() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::get("/fragment/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["active"], false);
        assert_eq!(json["slotsCount"], 0);
        assert!(json["subtitlers"].as_array().unwrap().is_empty());
    }
}

//! Application state management
//!
//! The AppState wires together the configuration, the client hub, the
//! subtitling engine, and the playlist view builder.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::hub::ClientHub;
use crate::playlist::PlaylistViewBuilder;
use crate::session::Engine;

/// Application state shared across all handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Connected clients
    pub hub: Arc<ClientHub>,

    /// Subtitling coordination engine
    pub engine: Arc<Engine>,

    /// Live/delayed playlist views over the transcoder's output
    pub playlists: PlaylistViewBuilder,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(ClientHub::new());
        let engine = Arc::new(Engine::new(
            hub.clone(),
            config.fragment.defaults,
            config.fragment.settle_ms,
        ));
        let playlists =
            PlaylistViewBuilder::new(config.source_playlist_path(), config.hls.window_size);
        Self {
            config,
            hub,
            engine,
            playlists,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wiring() {
        let state = AppState::new(ServerConfig::default());
        assert_eq!(state.hub.connection_count(), 0);
        assert!(!state.engine.live_snapshot().running);
        assert!(!state.playlists.status().has_manifest);
    }
}

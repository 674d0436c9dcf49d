//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::session::types::SessionSettings;

/// HLS source configuration
///
/// The transcoder (external) writes segments and a media playlist into
/// `segment_dir`; this server only reads them and derives the live and
/// delayed views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsConfig {
    /// Directory containing the transcoder's segments and playlist
    pub segment_dir: PathBuf,

    /// Name of the upstream media playlist within `segment_dir`
    pub source_playlist: String,

    /// Number of segments kept in the derived live/delayed windows
    pub window_size: usize,

    /// Upper bound accepted by POST /delay, in seconds
    pub max_delay_secs: u64,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            segment_dir: PathBuf::from("hls"),
            source_playlist: "source.m3u8".to_string(),
            window_size: 6,
            max_delay_secs: 300,
        }
    }
}

/// Fragment engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentConfig {
    /// Settle window after grace end before a slot is finalized, in
    /// milliseconds. Late auto-sent captions landing inside this window
    /// are still attached to the slot.
    pub settle_ms: u64,

    /// Default session settings; overridable per run
    pub defaults: SessionSettings,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            settle_ms: 800,
            defaults: SessionSettings::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// HLS source configuration
    pub hls: HlsConfig,

    /// Fragment engine configuration
    pub fragment: FragmentConfig,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            hls: HlsConfig::default(),
            fragment: FragmentConfig::default(),
            cors_enabled: true,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full path of the upstream playlist file
    pub fn source_playlist_path(&self) -> PathBuf {
        self.hls.segment_dir.join(&self.hls.source_playlist)
    }
}

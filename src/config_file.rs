//! Configuration file support
//!
//! Loads server configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{FragmentConfig, HlsConfig, ServerConfig};
use crate::session::types::SessionSettings;

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: ServerSettings,
    /// HLS source settings
    pub hls: HlsSettings,
    /// Fragment engine settings
    pub fragment: Option<FragmentSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsSettings {
    /// Directory containing the transcoder's segments and playlist
    pub segment_dir: PathBuf,
    /// Name of the upstream media playlist
    pub source_playlist: Option<String>,
    /// Segments kept in the derived live/delayed windows
    pub window_size: Option<usize>,
    /// Upper bound accepted by POST /delay, in seconds
    pub max_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentSettings {
    /// Settle window after grace end, in milliseconds
    pub settle_ms: Option<u64>,
    /// Segment duration the transcoder was configured with, in seconds
    pub segment_duration: Option<u64>,
    /// Spectator delay in seconds
    pub delay_sec: Option<u64>,
    /// Slot duration in seconds
    pub slot_duration: Option<u64>,
    /// Overlap between consecutive slots in seconds
    pub overlap_duration: Option<u64>,
    /// Grace period as a percentage of the slot duration
    pub grace_percent: Option<u64>,
    /// Lead time for ending/prepare notices in seconds
    pub notify_before: Option<u64>,
    /// Number of subtitlers required for rotation
    pub required_subtitlers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error), applied to this
    /// crate's targets unless RUST_LOG overrides it
    pub level: String,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let hls_defaults = HlsConfig::default();
        let settings_defaults = SessionSettings::default();
        let fragment = self.fragment.unwrap_or(FragmentSettings {
            settle_ms: None,
            segment_duration: None,
            delay_sec: None,
            slot_duration: None,
            overlap_duration: None,
            grace_percent: None,
            notify_before: None,
            required_subtitlers: None,
        });

        ServerConfig {
            host: self.server.host,
            port: self.server.port,
            hls: HlsConfig {
                segment_dir: self.hls.segment_dir,
                source_playlist: self
                    .hls
                    .source_playlist
                    .unwrap_or(hls_defaults.source_playlist),
                window_size: self.hls.window_size.unwrap_or(hls_defaults.window_size),
                max_delay_secs: self
                    .hls
                    .max_delay_secs
                    .unwrap_or(hls_defaults.max_delay_secs),
            },
            fragment: FragmentConfig {
                settle_ms: fragment.settle_ms.unwrap_or(800),
                defaults: SessionSettings {
                    segment_duration: fragment
                        .segment_duration
                        .unwrap_or(settings_defaults.segment_duration),
                    delay_sec: fragment.delay_sec.unwrap_or(settings_defaults.delay_sec),
                    slot_duration: fragment
                        .slot_duration
                        .unwrap_or(settings_defaults.slot_duration),
                    overlap_duration: fragment
                        .overlap_duration
                        .unwrap_or(settings_defaults.overlap_duration),
                    grace_percent: fragment
                        .grace_percent
                        .unwrap_or(settings_defaults.grace_percent),
                    notify_before: fragment
                        .notify_before
                        .unwrap_or(settings_defaults.notify_before),
                    required_subtitlers: fragment
                        .required_subtitlers
                        .unwrap_or(settings_defaults.required_subtitlers),
                },
            },
            cors_enabled: self.server.cors_enabled.unwrap_or(true),
            log_level: self
                .logging
                .map(|l| l.level)
                .unwrap_or_else(|| "info".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_file() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [hls]
            segment_dir = "media/hls"
        "#;
        let config: ConfigFile = toml::from_str(toml).unwrap();
        let server_config = config.into_server_config();
        assert_eq!(server_config.port, 8080);
        assert_eq!(server_config.hls.segment_dir, PathBuf::from("media/hls"));
        assert_eq!(server_config.hls.source_playlist, "source.m3u8");
        assert_eq!(server_config.fragment.settle_ms, 800);
    }

    #[test]
    fn test_fragment_overrides() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 3000

            [hls]
            segment_dir = "hls"
            max_delay_secs = 120

            [fragment]
            slot_duration = 12
            overlap_duration = 4
            grace_percent = 25
            required_subtitlers = 4

            [logging]
            level = "trace"
        "#;
        let config: ConfigFile = toml::from_str(toml).unwrap();
        let server_config = config.into_server_config();
        assert_eq!(server_config.hls.max_delay_secs, 120);
        assert_eq!(server_config.fragment.defaults.slot_duration, 12);
        assert_eq!(server_config.fragment.defaults.overlap_duration, 4);
        assert_eq!(server_config.fragment.defaults.grace_percent, 25);
        assert_eq!(server_config.fragment.defaults.required_subtitlers, 4);
        assert_eq!(server_config.log_level, "trace");
    }

    #[test]
    fn test_config_file_roundtrip() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 3000

            [hls]
            segment_dir = "hls"
        "#;
        let config: ConfigFile = toml::from_str(toml).unwrap();

        let mut temp_file = NamedTempFile::new().unwrap();
        let content = toml::to_string_pretty(&config).unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let loaded = ConfigFile::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.hls.segment_dir, config.hls.segment_dir);
    }
}

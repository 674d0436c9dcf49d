//! Collaborative live subtitling server
//!
//! Serves a delayed HLS view to spectators while a rotating team of
//! subtitlers types captions against the live edge. Overlapping slots are
//! fused into a gap-free transcript and delivered word by word, aligned
//! with the delayed picture.

mod config;
mod config_file;
mod error;
mod http;
mod hub;
mod messages;
mod playlist;
mod session;
mod state;
mod timer;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "subtitling-server";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first: the configured log level feeds the
    // subscriber. A load failure is reported once logging is up.
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let mut load_error = None;
    let config = if std::path::Path::new(&config_path).exists() {
        match crate::config_file::ConfigFile::from_file(&config_path) {
            Ok(file) => file.into_server_config(),
            Err(e) => {
                load_error = Some(format!(
                    "Failed to load config file {}: {}. Using defaults.",
                    config_path, e
                ));
                ServerConfig::default()
            }
        }
    } else {
        ServerConfig::default()
    };

    // Initialize logging
    init_logging(&config.log_level);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Some(warning) = load_error {
        tracing::warn!("{}", warning);
    }
    tracing::info!("Configuration loaded: {:?}", config);

    // Create application state
    let state = Arc::new(AppState::new(config.clone()));

    // Build router
    let app = create_router(state.clone());

    // Start server
    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| crate::error::SubtitleError::Config(format!("bad listen address: {e}")))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(crate::error::SubtitleError::Io)?;

    Ok(())
}

/// Initialize logging with tracing
///
/// RUST_LOG wins when set; otherwise the configured level applies to
/// this crate's targets.
fn init_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("subtitling_server={log_level},tower_http=debug").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

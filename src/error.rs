use thiserror::Error;

/// Main error type for the subtitling server
#[derive(Error, Debug)]
pub enum SubtitleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream playlist not found: {0}")]
    PlaylistNotFound(String),

    #[error("Upstream playlist parse error: {0}")]
    PlaylistParse(String),

    #[error("not enough segments")]
    NotEnoughSegments,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Live run already started")]
    AlreadyRunning,

    #[error("No live run in progress")]
    NotRunning,

    #[error("Fragment mode is not active")]
    FragmentsInactive,

    #[error("Not enough subtitlers connected: have {have}, need {need}")]
    NotEnoughSubtitlers { have: usize, need: usize },

    #[error("Caption rejected: {0}")]
    CaptionRejected(&'static str),

    #[error("Delay out of range: {0}")]
    DelayOutOfRange(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SubtitleError>;

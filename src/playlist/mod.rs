//! Playlist view building
//!
//! Reads the transcoder's media playlist and derives the two views this
//! server publishes: the live edge for subtitlers and the delayed window
//! for spectators. Files are never mutated here.

pub mod upstream;
pub mod view;

pub use upstream::UpstreamPlaylist;
pub use view::{PlaylistStatus, PlaylistViewBuilder};

//! HTTP server module
//!
//! Request routing and handling:
//! - Axum router with the REST control surface
//! - WebSocket endpoint for the realtime channel
//! - Derived playlist endpoints and segment serving
//! - CORS and trace middleware

pub mod handlers;
pub mod routes;
pub mod ws;

pub use routes::create_router;

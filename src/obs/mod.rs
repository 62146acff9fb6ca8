//! OBS Studio backend over WebSocket (obs-websocket 5.x protocol).
//!
//! Provides what the OBS context needs from a running OBS instance:
//! - Version handshake
//! - Stream service configuration (RTMP server + key)
//! - Stream start/stop/status
//!
//! Enable with feature flag: `backend-websocket`

pub mod backend;
pub mod client;

#[cfg(test)]
pub(crate) mod fake_server;

pub use backend::WebSocketBackend;
pub use client::OBSConnection;

//! Backend seam between the OBS context and a concrete way of driving OBS.
//!
//! The context only talks to OBS through [`ObsBackend`], so the lifecycle in
//! [`crate::context`] can run against obs-websocket or a test double alike.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Output module that provides the RTMP stream output
pub const OUTPUTS_MODULE: &str = "obs-outputs";

/// Versions reported by OBS when a session comes up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObsVersion {
    pub obs_version: String,
    pub websocket_version: String,
    pub platform: String,
}

/// Stream service an output publishes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamServiceSettings {
    /// Service name as OBS knows it (e.g., "Twitch")
    #[serde(default = "default_service")]
    pub service: String,
    /// RTMP ingest URL
    #[serde(default = "default_server")]
    pub server: String,
    /// Stream key
    #[serde(default = "default_key")]
    pub key: String,
}

pub const TWITCH_SERVICE: &str = "Twitch";
pub const TWITCH_SERVER: &str = "rtmp://live.twitch.tv/app";

fn default_service() -> String {
    TWITCH_SERVICE.to_string()
}

fn default_server() -> String {
    TWITCH_SERVER.to_string()
}

fn default_key() -> String {
    "CHANGEME".to_string()
}

impl StreamServiceSettings {
    /// Twitch ingest settings for the given stream key
    pub fn twitch(key: &str) -> Self {
        Self {
            service: default_service(),
            server: default_server(),
            key: key.to_string(),
        }
    }
}

impl Default for StreamServiceSettings {
    fn default() -> Self {
        Self::twitch(&default_key())
    }
}

/// Trait implemented by every way of driving OBS.
///
/// Calls arrive in lifecycle order: `startup`, `load_output_module`,
/// `create_stream_output`, then any number of `start_output`/`stop_output`
/// pairs, and finally `release_output`.
pub trait ObsBackend: Send {
    /// Short identifier for logs (e.g., "websocket")
    fn name(&self) -> &'static str;

    /// Bring the OBS session up and report its versions.
    fn startup(&mut self) -> Result<ObsVersion>;

    /// Make sure the named output module is loaded and usable.
    fn load_output_module(&mut self, module: &str) -> Result<()>;

    /// Create the stream output for a service.
    fn create_stream_output(&mut self, settings: &StreamServiceSettings) -> Result<()>;

    /// Start the stream output.
    ///
    /// Returns whether the output was started. An output that is already
    /// running counts as started.
    fn start_output(&mut self) -> Result<bool>;

    /// Stop the stream output.
    fn stop_output(&mut self) -> Result<()>;

    /// Release the stream output. Failures are logged, never returned.
    fn release_output(&mut self);
}

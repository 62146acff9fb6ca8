//! [`ObsBackend`] implementation on top of obs-websocket.

use super::client::{OBSClient, OBSConnection};
use crate::backend::{ObsBackend, ObsVersion, StreamServiceSettings, OUTPUTS_MODULE};
use anyhow::Result;
use tracing::{debug, warn};

/// Requests the outputs module has to expose for streaming
const STREAM_OUTPUT_REQUESTS: &[&str] = &[
    "SetStreamServiceSettings",
    "StartStream",
    "StopStream",
    "GetStreamStatus",
];

/// Drives a running OBS Studio through obs-websocket
pub struct WebSocketBackend {
    client: OBSClient,
    available_requests: Vec<String>,
}

impl WebSocketBackend {
    pub fn new(conn: OBSConnection) -> Result<Self> {
        Ok(Self {
            client: OBSClient::new(conn)?,
            available_requests: Vec::new(),
        })
    }
}

impl ObsBackend for WebSocketBackend {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn startup(&mut self) -> Result<ObsVersion> {
        debug!(obs = %self.client.connection().key(), "Connecting to OBS");
        let info = self.client.get_version()?;
        self.available_requests = info.available_requests;

        Ok(ObsVersion {
            obs_version: info.obs_version,
            websocket_version: info.obs_web_socket_version,
            platform: info.platform,
        })
    }

    fn load_output_module(&mut self, module: &str) -> Result<()> {
        if module != OUTPUTS_MODULE {
            anyhow::bail!("Module {} cannot be loaded over obs-websocket", module);
        }

        let missing: Vec<&str> = STREAM_OUTPUT_REQUESTS
            .iter()
            .copied()
            .filter(|r| !self.available_requests.iter().any(|a| a == r))
            .collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "OBS does not expose the {} stream requests: {}",
                module,
                missing.join(", ")
            );
        }
        Ok(())
    }

    fn create_stream_output(&mut self, settings: &StreamServiceSettings) -> Result<()> {
        self.client
            .set_stream_service_settings(&settings.service, &settings.server, &settings.key)
    }

    /// OBS acknowledges `StartStream` before the output goes live, so the
    /// acknowledgement itself means started. A refused start still counts
    /// when OBS reports the output as already active.
    fn start_output(&mut self) -> Result<bool> {
        match self.client.start_stream() {
            Ok(()) => Ok(true),
            Err(e) => match self.client.get_stream_status() {
                Ok(true) => {
                    debug!("Stream output was already active");
                    Ok(true)
                }
                _ => Err(e),
            },
        }
    }

    fn stop_output(&mut self) -> Result<()> {
        self.client.stop_stream()
    }

    fn release_output(&mut self) {
        match self.client.get_stream_status() {
            Ok(true) => {
                if let Err(e) = self.client.stop_stream() {
                    warn!(error = %e, "Failed to stop stream while releasing output");
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Failed to query stream status while releasing output")
            }
        }
        self.client.close();
    }
}

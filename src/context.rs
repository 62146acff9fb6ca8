//! OBS context: one OBS session plus the stream output configured on it.

use crate::backend::{ObsBackend, StreamServiceSettings, OUTPUTS_MODULE};
use anyhow::{Context as _, Result};
use tracing::{debug, info, warn};

/// Owns a backend and tracks the stream output lifecycle
pub struct ObsContext {
    backend: Box<dyn ObsBackend>,
    output_configured: bool,
    stream_running: bool,
}

impl ObsContext {
    pub fn new(backend: Box<dyn ObsBackend>) -> Self {
        Self {
            backend,
            output_configured: false,
            stream_running: false,
        }
    }

    /// Start OBS and load the outputs module
    pub fn init(&mut self) -> Result<()> {
        let version = self
            .backend
            .startup()
            .with_context(|| format!("OBS startup failed ({} backend)", self.backend.name()))?;
        info!(
            backend = self.backend.name(),
            obs_version = %version.obs_version,
            websocket_version = %version.websocket_version,
            platform = %version.platform,
            "OBS session started"
        );

        info!(module = OUTPUTS_MODULE, "Loading output module");
        self.backend
            .load_output_module(OUTPUTS_MODULE)
            .with_context(|| format!("Failed to load {} module", OUTPUTS_MODULE))?;
        Ok(())
    }

    /// Configure the stream output for Twitch with the given stream key
    pub fn configure_twitch_stream(&mut self, stream_key: &str) -> Result<()> {
        self.configure_stream(&StreamServiceSettings::twitch(stream_key))
    }

    /// Configure the stream output for an arbitrary RTMP service
    pub fn configure_stream(&mut self, settings: &StreamServiceSettings) -> Result<()> {
        if settings.key.trim().is_empty() {
            anyhow::bail!("Stream key for {} must not be empty", settings.service);
        }

        self.backend
            .create_stream_output(settings)
            .with_context(|| format!("Failed to create {} stream output", settings.service))?;
        self.output_configured = true;
        info!(service = %settings.service, server = %settings.server, "Stream output configured");
        Ok(())
    }

    /// Start streaming. Returns whether the stream is running.
    pub fn start_stream(&mut self) -> Result<bool> {
        if self.stream_running {
            return Ok(true);
        }
        if !self.output_configured {
            anyhow::bail!("No stream output configured");
        }

        self.stream_running = self.backend.start_output()?;
        Ok(self.stream_running)
    }

    pub fn stop_stream(&mut self) {
        if !self.stream_running {
            return;
        }
        if let Err(e) = self.backend.stop_output() {
            warn!(error = %e, "Failed to stop stream output");
        }
        self.stream_running = false;
    }

    /// Stop the stream and release the output
    pub fn clear_stream(&mut self) {
        self.stop_stream();
        if self.output_configured {
            self.backend.release_output();
            self.output_configured = false;
            debug!("Stream output released");
        }
    }

    pub fn is_stream_running(&self) -> bool {
        self.stream_running
    }

    pub fn is_output_configured(&self) -> bool {
        self.output_configured
    }
}

impl Drop for ObsContext {
    fn drop(&mut self) {
        self.clear_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Failures, MockBackend};
    use std::sync::{Arc, Mutex};

    fn context_with_log() -> (ObsContext, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ctx = ObsContext::new(Box::new(MockBackend::new(Arc::clone(&calls))));
        (ctx, calls)
    }

    fn calls_of(calls: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        calls.lock().unwrap().clone()
    }

    #[test]
    fn init_starts_obs_then_loads_outputs() {
        let (mut ctx, calls) = context_with_log();
        ctx.init().expect("init");
        assert_eq!(calls_of(&calls), vec!["startup", "load:obs-outputs"]);
    }

    #[test]
    fn init_stops_at_failed_startup() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let failures = Failures { startup: true, ..Default::default() };
        let mut ctx = ObsContext::new(Box::new(MockBackend::failing(Arc::clone(&calls), failures)));

        let err = ctx.init().unwrap_err();
        assert!(err.to_string().contains("OBS startup failed"));
        assert_eq!(calls_of(&calls), vec!["startup"]);
    }

    #[test]
    fn twitch_stream_uses_twitch_ingest() {
        let (mut ctx, calls) = context_with_log();
        ctx.configure_twitch_stream("live_abc").expect("configure");
        assert!(ctx.is_output_configured());
        assert_eq!(
            calls_of(&calls),
            vec!["create:Twitch:rtmp://live.twitch.tv/app:live_abc"]
        );
    }

    #[test]
    fn empty_stream_key_is_rejected() {
        let (mut ctx, calls) = context_with_log();
        assert!(ctx.configure_twitch_stream("  ").is_err());
        assert!(!ctx.is_output_configured());
        assert!(calls_of(&calls).is_empty());
    }

    #[test]
    fn start_requires_configured_output() {
        let (mut ctx, calls) = context_with_log();
        assert!(ctx.start_stream().is_err());
        assert!(calls_of(&calls).is_empty());
    }

    #[test]
    fn start_is_idempotent() {
        let (mut ctx, calls) = context_with_log();
        ctx.configure_twitch_stream("key").unwrap();
        assert!(ctx.start_stream().unwrap());
        assert!(ctx.start_stream().unwrap());

        let starts = calls_of(&calls).iter().filter(|c| *c == "start").count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn inactive_output_is_not_running() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let failures = Failures { start_inactive: true, ..Default::default() };
        let mut ctx = ObsContext::new(Box::new(MockBackend::failing(Arc::clone(&calls), failures)));
        ctx.configure_twitch_stream("key").unwrap();

        assert!(!ctx.start_stream().unwrap());
        assert!(!ctx.is_stream_running());
    }

    #[test]
    fn stop_without_running_stream_does_nothing() {
        let (mut ctx, calls) = context_with_log();
        ctx.stop_stream();
        assert!(calls_of(&calls).is_empty());
    }

    #[test]
    fn drop_stops_and_releases() {
        let (mut ctx, calls) = context_with_log();
        ctx.configure_twitch_stream("key").unwrap();
        ctx.start_stream().unwrap();
        drop(ctx);

        let log = calls_of(&calls);
        assert_eq!(&log[log.len() - 2..], &["stop".to_string(), "release".to_string()]);
    }

    #[test]
    fn clear_without_output_skips_release() {
        let (mut ctx, calls) = context_with_log();
        ctx.clear_stream();
        drop(ctx);
        assert!(calls_of(&calls).is_empty());
    }
}

//! Stream bootstrap entry points.
//!
//! `init_obs`, `start_obs`, `stop_obs` and `cleanup_obs` drive a single
//! process-wide [`ObsContext`] and answer with a human readable result line,
//! which is also logged.

use crate::backend::{ObsBackend, StreamServiceSettings};
use crate::config::Config;
use crate::context::ObsContext;
use anyhow::Result;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{error, info, warn};

pub const INITIALIZED: &str = "Successfully initialized OBS";
pub const ALREADY_INITIALIZED: &str = "OBS already initialized";
pub const INIT_FAILED: &str = "Failed to init OBS";
pub const CONFIGURE_FAILED: &str = "Failed to configure Twitch stream";
pub const NOT_INITIALIZED: &str = "OBS context isn't initialized";
pub const STREAM_STARTED: &str = "stream started";
pub const STREAM_START_FAILED: &str = "stream failed to start";
pub const STREAM_STOPPED: &str = "stream stopped";
pub const CONTEXT_CLEARED: &str = "OBS context cleared";

/// Creates a fresh backend for every initialization attempt
pub type BackendFactory = Box<dyn Fn() -> Result<Box<dyn ObsBackend>> + Send + Sync>;

/// Entry points bound to one backend factory and stream configuration
pub struct ObsBindings {
    connect: BackendFactory,
    stream: StreamServiceSettings,
    context: Mutex<Option<ObsContext>>,
}

impl ObsBindings {
    pub fn new(connect: BackendFactory, stream: StreamServiceSettings) -> Self {
        Self {
            connect,
            stream,
            context: Mutex::new(None),
        }
    }

    /// Bindings driving OBS over obs-websocket as described by `config`
    #[cfg(feature = "backend-websocket")]
    pub fn from_config(config: &Config) -> Self {
        use crate::obs::{OBSConnection, WebSocketBackend};

        let conn = OBSConnection::new(
            &config.connection.host,
            config.connection.port,
            config.connection.password.clone(),
        );
        let connect: BackendFactory = Box::new(move || -> Result<Box<dyn ObsBackend>> {
            let backend = WebSocketBackend::new(conn.clone())?;
            Ok(Box::new(backend) as Box<dyn ObsBackend>)
        });
        Self::new(connect, config.stream.clone())
    }

    /// Without a compiled-in backend every initialization fails
    #[cfg(not(feature = "backend-websocket"))]
    pub fn from_config(config: &Config) -> Self {
        let connect: BackendFactory = Box::new(|| -> Result<Box<dyn ObsBackend>> {
            anyhow::bail!("No OBS backend compiled in (enable backend-websocket)")
        });
        Self::new(connect, config.stream.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Option<ObsContext>> {
        self.context.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the OBS context and configure the stream output.
    ///
    /// `name` identifies the caller in logs.
    pub fn init_obs(&self, name: &str) -> String {
        let mut slot = self.lock();
        let result = if slot.is_some() {
            ALREADY_INITIALIZED
        } else {
            match self.create_context() {
                Err(e) => {
                    error!(caller = name, error = %format!("{:#}", e), "Failed to init OBS");
                    INIT_FAILED
                }
                Ok(mut ctx) => {
                    let configured = ctx.configure_stream(&self.stream);
                    *slot = Some(ctx);
                    match configured {
                        Ok(()) => INITIALIZED,
                        Err(e) => {
                            error!(
                                caller = name,
                                error = %format!("{:#}", e),
                                "Failed to configure stream"
                            );
                            CONFIGURE_FAILED
                        }
                    }
                }
            }
        };
        report(result)
    }

    fn create_context(&self) -> Result<ObsContext> {
        let backend = (self.connect)()?;
        let mut ctx = ObsContext::new(backend);
        ctx.init()?;
        Ok(ctx)
    }

    pub fn start_obs(&self) -> String {
        let mut slot = self.lock();
        let result = match slot.as_mut() {
            None => NOT_INITIALIZED,
            Some(ctx) => {
                info!("Attempting to start the stream");
                match ctx.start_stream() {
                    Ok(true) => STREAM_STARTED,
                    Ok(false) => STREAM_START_FAILED,
                    Err(e) => {
                        warn!(error = %format!("{:#}", e), "Stream start failed");
                        STREAM_START_FAILED
                    }
                }
            }
        };
        report(result)
    }

    pub fn stop_obs(&self) -> String {
        let mut slot = self.lock();
        let result = match slot.as_mut() {
            None => NOT_INITIALIZED,
            Some(ctx) => {
                ctx.stop_stream();
                STREAM_STOPPED
            }
        };
        report(result)
    }

    /// Drop the context, stopping the stream and releasing the output
    pub fn cleanup_obs(&self) -> String {
        let ctx = self.lock().take();
        drop(ctx);
        report(CONTEXT_CLEARED)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }
}

fn report(result: &str) -> String {
    info!(result, "OBS binding result");
    result.to_string()
}

// ─────────────────────────────────────────────────────────────────
// Process-wide bindings
// ─────────────────────────────────────────────────────────────────

static DEFAULT_BINDINGS: OnceLock<ObsBindings> = OnceLock::new();

/// Install the process-wide bindings. Fails if they are already in use.
pub fn install_default_bindings(bindings: ObsBindings) -> Result<()> {
    DEFAULT_BINDINGS
        .set(bindings)
        .map_err(|_| anyhow::anyhow!("OBS bindings are already installed"))
}

/// Process-wide bindings, built from the loaded config on first use
pub fn default_bindings() -> &'static ObsBindings {
    DEFAULT_BINDINGS.get_or_init(|| {
        let config = crate::config::load_config(None).unwrap_or_else(|e| {
            warn!(error = %format!("{:#}", e), "Failed to load config, using defaults");
            Config::default()
        });
        ObsBindings::from_config(&config)
    })
}

pub fn init_obs(name: &str) -> String {
    default_bindings().init_obs(name)
}

pub fn start_obs() -> String {
    default_bindings().start_obs()
}

pub fn stop_obs() -> String {
    default_bindings().stop_obs()
}

pub fn cleanup_obs() -> String {
    default_bindings().cleanup_obs()
}

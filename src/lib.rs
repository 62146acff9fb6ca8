pub mod backend;
pub mod bindings;
pub mod config;
pub mod context;
pub mod harness;
#[cfg(feature = "backend-websocket")]
pub mod obs;
pub mod telemetry;

/// Lowercase name for paths and log targets
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

pub use bindings::{cleanup_obs, init_obs, start_obs, stop_obs, ObsBindings};
pub use harness::AssertionFailure;

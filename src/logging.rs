//! `tracing` subscriber setup for the demonstration binary.
//!
//! Grounded in `base_system/logging.rs`'s `tracing_subscriber::registry()`
//! plus `fmt::layer()` composition, trimmed to a single console layer: the
//! teacher's file rotation, zip archiving, panic/signal hooks, and TUI
//! broadcast channel all exist to serve its terminal UI, which this client
//! does not carry.

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Install a single ANSI console layer at `DEBUG` (if `debug`) or `INFO`.
/// Safe to call once per process; a second call returns
/// [`LogError::AlreadyInitialized`] rather than panicking.
pub fn init(debug: bool) -> Result<(), LogError> {
    let level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_thread_names(true)
        .with_filter(level);

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .map_err(|err| {
            let message = err.to_string();
            if message.contains("global subscriber") || message.contains("already") {
                LogError::AlreadyInitialized
            } else {
                LogError::SubscriberInit(err)
            }
        })
}

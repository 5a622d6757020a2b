//! Process-wide log setup.
//!
//! Library code logs through the `log` macros; this installs a
//! `tracing-subscriber` registry and bridges `log` records into it.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to bridge log records: {0}")]
    Bridge(#[from] log::SetLoggerError),

    #[error("Failed to install subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Builds the filter: `RUST_LOG` when set, otherwise `level`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs the global subscriber. Plain text by default, one JSON object
/// per line when `json` is set.
///
/// Only the first call in a process takes effect; later calls return an
/// error that callers may ignore.
pub fn init(level: &str, json: bool) -> Result<(), LoggingError> {
    let format_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let subscriber = Registry::default()
        .with(env_filter(level))
        .with(format_layer);

    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    Ok(())
}

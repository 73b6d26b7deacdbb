use std::env;
use std::io;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOGGING_INSTALLED: OnceLock<()> = OnceLock::new();

/// Errors that can arise while standing up structured logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid logging filter: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install logging subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global stderr subscriber.
///
/// The first call wins; subsequent calls are no-ops.
pub fn init_logging(debug: bool) -> Result<(), LoggingError> {
    if LOGGING_INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = build_filter(debug)?;
    let stderr_layer = tracing_subscriber::fmt::layer()
        .event_format(
            tracing_subscriber::fmt::format()
                .with_timer(UtcTime::rfc_3339())
                .with_level(true)
                .with_target(debug)
                .with_ansi(false),
        )
        .with_writer(io::stderr)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()?;
    let _ = LOGGING_INSTALLED.set(());

    debug!("Structured logging enabled");
    Ok(())
}

fn build_filter(debug: bool) -> Result<EnvFilter, ParseError> {
    if let Ok(spec) = env::var("XFORMER_LOG") {
        if !spec.trim().is_empty() {
            return EnvFilter::try_new(spec);
        }
    }

    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) if debug => EnvFilter::try_new("debug"),
        Err(_) => EnvFilter::try_new("info"),
    }
}

#![forbid(unsafe_code)]

//! Logging conventions.
//!
//! All events of this crate use the `tracing` target [`TARGET`]:
//!
//! - `debug!` for block lifecycle (created, resolved, discarded) and drain
//!   decisions,
//! - `trace!` for per-event delivery,
//! - `warn!` for protocol violations by the caller (events for a gesture
//!   that never started).
//!
//! With the `tracing-json` feature, [`init_json_logging`] installs a global
//! JSON subscriber filtered by `RUST_LOG` (or the given default directive).

/// `tracing` target used by the queue.
pub const TARGET: &str = "inputq.queue";

/// Failure to install the global subscriber.
#[derive(Debug)]
pub enum LoggingError {
    /// The filter directive did not parse.
    Filter(String),
    /// A global subscriber is already installed.
    AlreadyInstalled(String),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filter(msg) => write!(f, "invalid log filter: {msg}"),
            Self::AlreadyInstalled(msg) => write!(f, "cannot install subscriber: {msg}"),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Install a JSON-formatting global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (for example
/// `"inputq.queue=debug"`) is used.
#[cfg(feature = "tracing-json")]
pub fn init_json_logging(default_directive: &str) -> Result<(), LoggingError> {
    use tracing_subscriber::EnvFilter;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| LoggingError::Filter(e.to_string()))?,
    };
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_stable() {
        assert_eq!(TARGET, "inputq.queue");
    }

    #[test]
    fn error_display() {
        let err = LoggingError::Filter("bad".into());
        assert_eq!(err.to_string(), "invalid log filter: bad");
    }
}

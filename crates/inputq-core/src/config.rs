#![forbid(unsafe_code)]

//! Queue configuration.
//!
//! All tunables of the queue live in [`QueueConfig`]. With the `config`
//! feature it can be loaded from TOML or JSON; durations are written in
//! milliseconds.
//!
//! ```toml
//! # inputq.toml
//! content_response_timeout_ms = 400
//! long_tap_timeout_ms = 500
//! wheel_transaction_timeout_ms = 1500
//! keyboard_passive_listeners = false
//! ```
//!
//! A `content_response_timeout_ms` of zero puts the queue in immediate
//! fallback mode: every confirmation wait is resolved by timeout before the
//! call that created it returns. Tests use this to exercise the fallback
//! deterministically.

#[cfg(feature = "config")]
use std::path::Path;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use web_time::Duration;

/// Default delay before an unanswered block falls back.
pub const DEFAULT_CONTENT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(400);
/// Default long-press delay.
pub const DEFAULT_LONG_TAP_TIMEOUT: Duration = Duration::from_millis(500);
/// Default maximum gap between wheel events of one transaction.
pub const DEFAULT_WHEEL_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(1500);

/// Tunable parameters of an [`InputQueue`](crate::queue::InputQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct QueueConfig {
    /// Delay before a block still waiting for confirmation falls back.
    /// Zero selects immediate fallback.
    #[cfg_attr(
        feature = "config",
        serde(rename = "content_response_timeout_ms", with = "duration_ms")
    )]
    pub content_response_timeout: Duration,

    /// Long-press delay of the gesture recognizer.
    #[cfg_attr(feature = "config", serde(rename = "long_tap_timeout_ms", with = "duration_ms"))]
    pub long_tap_timeout: Duration,

    /// Long-press gestures are recognized at all.
    pub long_tap_enabled: bool,

    /// Maximum gap between two wheel events of the same transaction.
    #[cfg_attr(
        feature = "config",
        serde(rename = "wheel_transaction_timeout_ms", with = "duration_ms")
    )]
    pub wheel_transaction_timeout: Duration,

    /// Keyboard events are also delivered to passive content listeners.
    pub keyboard_passive_listeners: bool,

    /// Touch blocks wait for touch-behaviour hints before handling.
    pub touch_action_enabled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            content_response_timeout: DEFAULT_CONTENT_RESPONSE_TIMEOUT,
            long_tap_timeout: DEFAULT_LONG_TAP_TIMEOUT,
            long_tap_enabled: true,
            wheel_transaction_timeout: DEFAULT_WHEEL_TRANSACTION_TIMEOUT,
            keyboard_passive_listeners: false,
            touch_action_enabled: true,
        }
    }
}

impl QueueConfig {
    /// Configuration for deterministic tests: every wait falls back
    /// immediately.
    #[must_use]
    pub fn immediate_fallback() -> Self {
        Self {
            content_response_timeout: Duration::ZERO,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_content_response_timeout(mut self, timeout: Duration) -> Self {
        self.content_response_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_touch_action(mut self, enabled: bool) -> Self {
        self.touch_action_enabled = enabled;
        self
    }

    /// Load from a TOML string.
    #[cfg(feature = "config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(ConfigError::Toml)?;
        config.validated()
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "config")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(ConfigError::Json)?;
        config.validated()
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Validate parameter ranges.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.wheel_transaction_timeout.is_zero() {
            errors.push("wheel_transaction_timeout must be > 0".into());
        }

        if self.long_tap_enabled && self.long_tap_timeout.is_zero() {
            errors.push("long_tap_timeout must be > 0 when long taps are enabled".into());
        }

        // Anything beyond a few seconds stalls input visibly.
        if self.content_response_timeout > Duration::from_secs(10) {
            errors.push(format!(
                "content_response_timeout must be <= 10s, got {}ms",
                self.content_response_timeout.as_millis()
            ));
        }

        errors
    }

    /// `self` if valid, otherwise [`ConfigError::Validation`].
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

#[cfg(feature = "config")]
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use web_time::Duration;

    pub(super) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur when loading a queue configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config")]
    Toml(toml::de::Error),
    /// JSON parse error.
    #[cfg(feature = "config")]
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "config")]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            #[cfg(feature = "config")]
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Toml(e) => Some(e),
            #[cfg(feature = "config")]
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

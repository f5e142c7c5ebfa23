//! # ragbot-telemetry
//!
//! Logging setup for ragbot binaries and tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ragbot_telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(TelemetryConfig::from_env())?;
//! tracing::info!(request_id = "r-1", "ready");
//! ```
//!
//! Tests capture records with [`InMemoryLayer`] instead of printing them.

pub mod memory;

use std::str::FromStr;

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

pub use memory::{CapturedEvent, EventStorage, InMemoryLayer};

/// Output format of the `fmt` layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected 'pretty' or 'json')")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset, e.g. `"info,ragbot_runner=debug"`.
    pub default_filter: String,
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { format: LogFormat::Pretty, default_filter: "info".to_string(), with_target: false }
    }
}

impl TelemetryConfig {
    /// Defaults, with the format taken from `RAGBOT_LOG_FORMAT` when it parses.
    pub fn from_env() -> Self {
        let format = std::env::var("RAGBOT_LOG_FORMAT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default();
        Self { format, ..Self::default() }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

/// Install the global subscriber: an env filter from `RUST_LOG` (falling
/// back to `default_filter`) and a `fmt` layer in the configured format.
///
/// Fails if a global subscriber is already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_target(config.with_target))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(config.with_target),
            )
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_formats() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn second_init_fails() {
        let config = TelemetryConfig::default().with_default_filter("warn");
        // Other tests in this binary never install a global subscriber.
        assert!(init_telemetry(config.clone()).is_ok());
        assert!(init_telemetry(config).is_err());
    }
}

//! Logging initialization
//!
//! Library code only emits `tracing` events; installing a subscriber is
//! left to the binary. [`init_logging`] installs a `fmt` subscriber once
//! per process.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard tracing filter (e.g., "info", "onnx_fuser=debug")
//! - `ONNX_FUSER_LOG_LEVEL`: Simple log level (error, warn, info, debug, trace)
//!
//! # Example
//!
//! ```ignore
//! use onnx_fuser::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Debug)?;
//! tracing::info!("Optimizer started");
//! ```

use std::fmt;
use std::str::FromStr;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Set once a subscriber has been installed
static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Environment variable for log level override
pub const LOG_LEVEL_ENV: &str = "ONNX_FUSER_LOG_LEVEL";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Invalid log level or filter string
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Another global subscriber is already installed
    #[error("failed to install subscriber: {0}")]
    SubscriberInstall(String),
}

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

impl LogLevel {
    /// Parse a level name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to tracing Level
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }

    /// Convert to EnvFilter string
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| LoggingError::InvalidLogLevel(s.to_string()))
    }
}

/// Install the global `fmt` subscriber.
///
/// The filter comes from `RUST_LOG` when set, then `ONNX_FUSER_LOG_LEVEL`,
/// then `level`. Only the first call in a process installs anything; later
/// calls return `Ok(())`.
pub fn init_logging(level: LogLevel) -> Result<(), LoggingError> {
    let mut result = Ok(());
    TRACING_INITIALIZED.get_or_init(|| {
        result = install(level);
    });
    result
}

fn install(level: LogLevel) -> Result<(), LoggingError> {
    let filter = build_env_filter(
        std::env::var("RUST_LOG").ok(),
        std::env::var(LOG_LEVEL_ENV).ok(),
        level,
    )?;
    let layer = fmt_layer::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| LoggingError::SubscriberInstall(e.to_string()))
}

/// Build the filter from `RUST_LOG`, the level override, and the default
fn build_env_filter(
    rust_log: Option<String>,
    level_override: Option<String>,
    default_level: LogLevel,
) -> Result<EnvFilter, LoggingError> {
    if let Some(rust_log) = rust_log {
        return EnvFilter::try_new(rust_log)
            .map_err(|e| LoggingError::InvalidLogLevel(e.to_string()));
    }

    let level = match level_override {
        Some(s) => s.parse::<LogLevel>()?,
        None => default_level,
    };
    EnvFilter::try_new(level.as_filter_str())
        .map_err(|e| LoggingError::InvalidLogLevel(e.to_string()))
}

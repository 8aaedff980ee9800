//! Logging initialization.
//!
//! One `tracing-subscriber` fmt layer, filtered by an `EnvFilter`. `RUST_LOG`
//! wins over the configured directive when set.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const ENV_FORMAT: &str = "KEEL_LOG_FORMAT";
pub const ENV_DIRECTIVE: &str = "KEEL_LOG";

/// Output format of log lines.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line, human oriented
    Pretty,
    /// Single-line text
    Compact,
}

impl FromStr for LogFormat {
    type Err = LogConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" | "text" => Ok(LogFormat::Compact),
            _ => Err(LogConfigError::UnknownFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogConfigError {
    #[error("unknown log format {0:?} (expected json, pretty or compact)")]
    UnknownFormat(String),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset (e.g. `info,keel_cqrs=debug`)
    pub directive: String,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            directive: "info".to_string(),
            with_target: false,
        }
    }
}

impl LogConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }

    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Defaults overridden by `KEEL_LOG_FORMAT` and `KEEL_LOG`.
    pub fn from_env() -> Result<Self, LogConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LogConfigError> {
        let mut config = Self::default();
        if let Some(format) = lookup(ENV_FORMAT) {
            config.format = format.parse()?;
        }
        if let Some(directive) = lookup(ENV_DIRECTIVE).filter(|d| !d.trim().is_empty()) {
            config.directive = directive;
        }
        Ok(config)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.directive))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber with settings from the environment.
///
/// An invalid `KEEL_LOG_FORMAT` falls back to the defaults.
pub fn init() {
    let config = LogConfig::from_env().unwrap_or_default();
    init_with(&config);
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_with(config: &LogConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(config.with_target)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.is_ok()
}

/// Logging for tests: compact output captured by the test harness.
///
/// Call at the top of each test that wants logs; repeat calls are no-ops.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .try_init();
}

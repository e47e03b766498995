//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable holding a filter directive; takes precedence over
/// `RUST_LOG`.
pub const LOG_ENV: &str = "DUPFIND_LOG";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown log format '{other}', expected 'pretty' or 'json'"
            ))),
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds a logging config from file settings and the process environment.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let env_filter = std::env::var(LOG_ENV)
            .ok()
            .or_else(|| std::env::var("RUST_LOG").ok());
        Self::resolve(settings, verbose, env_filter)
    }

    /// Precedence for the filter: environment, then `--verbose`, then the
    /// configured level, then `info`. An unknown format falls back to pretty.
    fn resolve(settings: Option<&LoggingSettings>, verbose: bool, env_filter: Option<String>) -> Self {
        let filter = env_filter
            .filter(|f| !f.trim().is_empty())
            .or_else(|| verbose.then(|| "debug".to_string()))
            .or_else(|| settings.and_then(|s| s.level.clone()))
            .unwrap_or_else(|| "info".to_string());

        let format = settings
            .and_then(|s| s.format.as_deref())
            .and_then(|f| f.parse().ok())
            .unwrap_or_default();

        Self {
            filter,
            format,
            file: settings.and_then(|s| s.file.clone()),
        }
    }
}

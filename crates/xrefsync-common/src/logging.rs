//! Logging configuration and initialization.
//!
//! Central tracing setup shared by the loader binaries and the test
//! harnesses. Console output is always enabled; an optional daily-rotated
//! file appender can be added on top. Use structured fields rather than
//! string interpolation:
//!
//! ```rust
//! use tracing::info;
//! info!(source = "RefSeq_dna", loaded = 120_543, "source promoted");
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Verbosity threshold, ordered from chattiest to quietest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn as_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(anyhow::anyhow!(
                "unrecognised log level '{}', expected trace, debug, info, warn or error",
                other
            )),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum level to emit.
    pub level: LogLevel,

    /// Emit JSON lines instead of human-readable text.
    pub json: bool,

    /// When set, also write daily-rotated files into this directory.
    pub log_dir: Option<PathBuf>,

    /// File name prefix for rotated files, e.g. "xrefsync" ->
    /// "xrefsync.2026-08-02.log".
    pub file_prefix: String,

    /// Extra filter directives, e.g. "sqlx=warn".
    pub filter_directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            log_dir: None,
            file_prefix: "xrefsync".to_string(),
            filter_directives: None,
        }
    }
}

impl LogConfig {
    /// Load configuration from `LOG_LEVEL`, `LOG_FORMAT`, `LOG_DIR` and
    /// `LOG_FILTER` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.level = level.parse()?;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.json = format.eq_ignore_ascii_case("json");
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            config.log_dir = Some(PathBuf::from(dir));
        }
        if let Ok(filter) = std::env::var("LOG_FILTER") {
            config.filter_directives = Some(filter);
        }

        Ok(config)
    }
}

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let mut filter =
        EnvFilter::from_default_env().add_directive(config.level.as_level().into());

    if let Some(ref directives) = config.filter_directives {
        for directive in directives.split(',') {
            filter = filter.add_directive(
                directive
                    .trim()
                    .parse()
                    .context("Failed to parse filter directive")?,
            );
        }
    }

    let registry = tracing_subscriber::registry().with(filter);

    match &config.log_dir {
        None => {
            let console = fmt::layer().with_writer(std::io::stdout);
            let console = if config.json {
                console.json().boxed()
            } else {
                console.boxed()
            };
            registry.with(console).try_init()?;
        }
        Some(dir) => {
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            // The guard must outlive the process for the writer thread to
            // keep flushing.
            std::mem::forget(guard);

            let console = fmt::layer().with_writer(std::io::stdout);
            let file = fmt::layer().with_writer(non_blocking).with_ansi(false);
            let (console, file) = if config.json {
                (console.json().boxed(), file.json().boxed())
            } else {
                (console.boxed(), file.boxed())
            };
            registry.with(console).with(file).try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_case_insensitively() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" warn ".parse::<LogLevel>().unwrap(), LogLevel::Warn);

        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains("unrecognised log level 'loud'"));
    }

    #[test]
    fn log_levels_order_by_severity() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert_eq!(LogLevel::Info.as_str(), "info");
    }

    #[test]
    fn default_config_is_console_text_info() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(!config.json);
        assert!(config.log_dir.is_none());
    }
}

//! Logging subsystem for the quilt engine
//!
//! All engine diagnostics go through `tracing`. This module installs the
//! process-wide subscriber: plain text for terminals or one JSON object
//! per line for log collectors. `RUST_LOG` still overrides the configured
//! level when set, so a single module can be turned up without a restart
//! of the config.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// `[logging]` section of the engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,

    /// Prefix each line with a timestamp
    pub with_timestamp: bool,

    /// Include the emitting module path
    pub with_target: bool,

    /// Emit JSON lines instead of text
    pub json_format: bool,

    /// Extra `EnvFilter` directives, e.g. `quilt_core::core_canvas::sync=trace`
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, ..Default::default() }
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Build the filter: `RUST_LOG` if present, else level plus directives
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let mut filter = EnvFilter::default().add_directive(self.level.as_filter().into());
        for raw in &self.directives {
            let directive = raw
                .parse()
                .map_err(|e| LoggingError::InvalidConfiguration(format!("{raw}: {e}")))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Initialize logging with defaults
///
/// # Example
/// ```
/// use quilt_core::logging::init_logging;
///
/// init_logging().expect("Failed to initialize logging");
/// ```
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(&LogConfig::default())
}

/// Initialize logging from a `LogConfig`
///
/// Lines go to stderr. Fails with `InitializationFailed` if a global
/// subscriber already exists.
///
/// # Example
/// ```
/// use quilt_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false);
/// init_logging_with_config(&config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: &LogConfig) -> Result<(), LoggingError> {
    let env_filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(env_filter);

    // stdout stays free for command output
    let result = match (config.json_format, config.with_timestamp) {
        (true, true) => registry
            .with(fmt::layer().json().with_target(config.with_target).with_writer(std::io::stderr))
            .try_init(),
        (true, false) => registry
            .with(fmt::layer().json().without_time().with_target(config.with_target).with_writer(std::io::stderr))
            .try_init(),
        (false, true) => registry
            .with(fmt::layer().with_target(config.with_target).with_writer(std::io::stderr))
            .try_init(),
        (false, false) => registry
            .with(fmt::layer().without_time().with_target(config.with_target).with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.with_timestamp);
        assert!(config.with_target);
        assert!(!config.json_format);
        assert!(config.directives.is_empty());
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new(LogLevel::Debug)
            .with_timestamp(false)
            .with_target(false)
            .json_format(true)
            .directive("quilt_core::core_canvas::sync=trace");

        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.with_timestamp);
        assert!(!config.with_target);
        assert!(config.json_format);
        assert_eq!(config.directives.len(), 1);
    }

    #[test]
    fn test_bad_directive_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LogConfig::default().directive("quilt=shouting");
        assert!(matches!(config.env_filter(), Err(LoggingError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_partial_toml_section() {
        let config: LogConfig = toml::from_str("level = \"warn\"\njson_format = true").unwrap();
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.json_format);
        assert!(config.with_target);
    }
}

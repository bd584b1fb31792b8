//! Logging setup
//!
//! The layer logs through `tracing`; whichever subscriber the process
//! installs receives the `info`/`warn`/`error` diagnostics. This module
//! offers a ready-made `tracing-subscriber` setup for binaries and tests,
//! configured the same way as [`AmiConfig`](crate::config::AmiConfig).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AmiError, AmiResult};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    /// One JSON object per line on stdout
    Json,
}

/// Subscriber settings
///
/// `RUST_LOG` is honoured; `level` and `directives` are added on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level, e.g. `"info"`
    pub level: String,
    pub format: LogFormat,
    /// Include file and line of each event
    pub source_location: bool,
    /// Extra filter directives such as `ami_core::correlation=trace`
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
            source_location: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level: level.to_string(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    /// Add a per-target filter directive
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Build the filter, rejecting an unknown level or malformed directive
    pub fn env_filter(&self) -> AmiResult<EnvFilter> {
        let mut filter = EnvFilter::from_default_env().add_directive(parse_log_level(&self.level)?.into());
        for raw in &self.directives {
            let directive = Directive::from_str(raw)
                .map_err(|e| AmiError::Config(format!("Invalid log directive {}: {}", raw, e)))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Install a global fmt subscriber built from `config`
///
/// Fails if the config is invalid or a global subscriber is already
/// installed.
pub fn setup_logging(config: &LoggingConfig) -> AmiResult<()> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.env_filter()?)
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let installed = match config.format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_writer(std::io::stdout).try_init(),
    };
    installed.map_err(|e| AmiError::Config(format!("Failed to install logger: {}", e)))?;

    tracing::info!("AMI logging at {} ({:?})", config.level, config.format);
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> AmiResult<Level> {
    Level::from_str(level.trim()).map_err(|_| AmiError::Config(format!("Invalid log level: {}", level)))
}

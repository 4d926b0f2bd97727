//! Logging configuration for corewire.
//!
//! Unlike the rest of the crate's configuration, the process tracing
//! subscriber is a global, install-once resource, so this module's only
//! supported entry point takes a [`crate::config::Config`] directly rather
//! than exposing an independent set of defaults: level and format both come
//! from `Config::log_level`/`Config::log_format`, so a caller that builds
//! its `Container` from a given `Config` gets matching logging for free.
//!
//! # Example
//!
//! ```rust,ignore
//! use corewire::{Config, logging};
//!
//! let config = Config::from_env();
//! logging::init_from_config(&config);
//! ```
//!
//! Manual overrides remain available through [`LoggingBuilder`] for callers
//! that want a subscriber shaped differently from their `Container`'s
//! `Config` (e.g. a louder subscriber in a one-off diagnostic binary).

#[cfg(feature = "logging")]
use tracing::Level;

use crate::config::{Config, LogFormat, LogLevel};

/// Maps the resolution core's own [`LogLevel`] toggle to a `tracing::Level`.
/// `Off` has no `tracing::Level` equivalent; callers should skip `init()`
/// entirely rather than ask this module to filter at a level tracing
/// doesn't have.
#[cfg(feature = "logging")]
pub fn tracing_level_for(level: LogLevel) -> Option<Level> {
    match level {
        LogLevel::Off => None,
        LogLevel::Errors => Some(Level::ERROR),
        LogLevel::Registration | LogLevel::Optimization => Some(Level::INFO),
        LogLevel::All => Some(Level::DEBUG),
    }
}

/// Builder for the process tracing subscriber. Always seeded from a
/// [`Config`] via [`LoggingBuilder::from_config`]; the setters below exist
/// for the cases where a caller wants to adjust one field of that seed
/// (e.g. force pretty output in a debug build that otherwise runs with
/// `LogFormat::Json`) without hand-rolling the rest.
#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target_filter: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
}

#[cfg(feature = "logging")]
impl LoggingBuilder {
    /// Seeds a builder from `config`'s `log_level`/`log_format`.
    /// `LogLevel::Off` degrades to `ERROR` here since the builder has no
    /// "don't log at all" state short of never calling `init()`; callers
    /// that want the `Off` behavior should check `config.log_level` before
    /// calling this at all, as [`init_from_config`] does.
    pub fn from_config(config: &Config) -> Self {
        Self {
            level: tracing_level_for(config.log_level).unwrap_or(Level::ERROR),
            format: config.log_format,
            target_filter: None,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
        }
    }

    /// Overrides the level the seed `Config` selected.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Overrides the format the seed `Config` selected.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Restricts output to events targeting `corewire` itself, filtering
    /// out whatever other crates share the process subscriber.
    pub fn corewire_only(mut self) -> Self {
        self.target_filter = Some("corewire");
        self
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    /// Installs this configuration as the process-wide tracing subscriber.
    ///
    /// Requires either `logging-json` or `logging-pretty` feature to be
    /// enabled; a no-op otherwise, since no subscriber implementation is
    /// available to install.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = match self.target_filter {
            Some(target) => EnvFilter::new(format!("{}={}", target, self.level)),
            None => EnvFilter::new(self.level.to_string()),
        };

        match self.format {
            LogFormat::Json => {
                #[cfg(feature = "logging-json")]
                let subscriber = fmt::layer().json();
                #[cfg(not(feature = "logging-json"))]
                let subscriber = fmt::layer();
                let subscriber = subscriber
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_thread_ids(self.with_thread_ids)
                    .with_target(true);
                tracing_subscriber::registry().with(filter).with(subscriber).init();
            }
            LogFormat::Pretty => {
                let subscriber = fmt::layer()
                    .pretty()
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_thread_ids(self.with_thread_ids)
                    .with_target(true);
                tracing_subscriber::registry().with(filter).with(subscriber).init();
            }
            LogFormat::Compact => {
                let subscriber = fmt::layer()
                    .compact()
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_thread_ids(self.with_thread_ids)
                    .with_target(true);
                tracing_subscriber::registry().with(filter).with(subscriber).init();
            }
        }
    }

    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {
        // No subscriber implementation compiled in; nothing to install.
    }
}

/// Installs the process tracing subscriber from `config`, or does nothing
/// if `config.log_level` is `Off` or if neither subscriber feature is
/// compiled in — in both cases whatever subscriber (if any) the host
/// process already installed is left untouched.
#[cfg(feature = "logging")]
pub fn init_from_config(config: &Config) {
    if matches!(config.log_level, LogLevel::Off) {
        return;
    }
    LoggingBuilder::from_config(config).init();
}

#[cfg(not(feature = "logging"))]
pub fn init_from_config(_config: &Config) {}

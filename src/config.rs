//! Process-wide configuration toggles, read once at container construction.
//!
//! No config file or wire format exists — everything here is either
//! programmatic (`Config::builder()`) or read from the environment once at
//! startup via [`Config::from_env`].

use std::time::Duration;

/// Verbosity of the diagnostics engine's own logging, independent of the
/// application's tracing subscriber configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Errors,
    Registration,
    Optimization,
    All,
}

impl LogLevel {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::Off),
            "errors" => Some(Self::Errors),
            "registration" => Some(Self::Registration),
            "optimization" => Some(Self::Optimization),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn default_for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::All
        } else {
            Self::Errors
        }
    }
}

/// Output shape for the process subscriber `src/logging.rs` installs.
/// Lives here rather than in `logging.rs` so [`Config`] stays usable with
/// the `logging` feature turned off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured logging, one line per event. Default in release
    /// builds, where logs are typically aggregated and parsed by tooling.
    Json,
    /// Human-readable colorized output. Default in debug builds.
    #[default]
    Pretty,
    /// Compact single-line, uncolored output.
    Compact,
}

impl LogFormat {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }

    fn default_for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Process-wide toggles for the resolution core.
#[derive(Debug, Clone)]
pub struct Config {
    pub monitoring_enabled: bool,
    pub optimization_enabled: bool,
    pub optimization_debounce: Duration,
    pub diagnostics_batch_interval: Duration,
    pub diagnostics_max_batch_size: usize,
    pub diagnostics_health_interval: Duration,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    /// Usage-count threshold at which a type is auto-flagged "optimized".
    /// Not part of the environment-variable table; configurable only
    /// through the builder.
    pub auto_optimization_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitoring_enabled: cfg!(debug_assertions),
            optimization_enabled: false,
            optimization_debounce: Duration::from_millis(100),
            diagnostics_batch_interval: Duration::from_secs(2),
            diagnostics_max_batch_size: 50,
            diagnostics_health_interval: Duration::from_secs(30),
            log_level: LogLevel::default_for_build(),
            log_format: LogFormat::default_for_build(),
            auto_optimization_threshold: 10,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Loads overrides from the environment on top of the build-aware
    /// defaults. Unset or unparsable variables are ignored silently — a
    /// malformed env var degrades to the default rather than failing
    /// startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_bool("COREWIRE_MONITORING_ENABLED") {
            config.monitoring_enabled = v;
        }
        if let Some(v) = env_bool("COREWIRE_OPTIMIZATION_ENABLED") {
            config.optimization_enabled = v;
        }
        if let Some(ms) = env_u64("COREWIRE_OPTIMIZATION_DEBOUNCE_MS") {
            config.optimization_debounce = Duration::from_millis(ms.clamp(50, 1000));
        }
        if let Some(s) = env_f64("COREWIRE_DIAGNOSTICS_BATCH_INTERVAL_S") {
            config.diagnostics_batch_interval = Duration::from_secs_f64(s);
        }
        if let Some(n) = env_u64("COREWIRE_DIAGNOSTICS_MAX_BATCH_SIZE") {
            config.diagnostics_max_batch_size = n as usize;
        }
        if let Some(s) = env_f64("COREWIRE_DIAGNOSTICS_HEALTH_INTERVAL_S") {
            config.diagnostics_health_interval = Duration::from_secs_f64(s);
        }
        if let Ok(raw) = std::env::var("COREWIRE_LOG_LEVEL") {
            if let Some(level) = LogLevel::from_str(raw.trim()) {
                config.log_level = level;
            }
        }
        if let Ok(raw) = std::env::var("COREWIRE_LOG_FORMAT") {
            if let Some(format) = LogFormat::from_str(raw.trim()) {
                config.log_format = format;
            }
        }

        config
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| match v.trim() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    })
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Fluent builder for [`Config`], for programmatic construction (tests,
/// isolated container instances) that should not read the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn monitoring_enabled(mut self, enabled: bool) -> Self {
        self.config.monitoring_enabled = enabled;
        self
    }

    pub fn optimization_enabled(mut self, enabled: bool) -> Self {
        self.config.optimization_enabled = enabled;
        self
    }

    pub fn optimization_debounce(mut self, debounce: Duration) -> Self {
        self.config.optimization_debounce =
            Duration::from_millis(debounce.as_millis().clamp(50, 1000) as u64);
        self
    }

    pub fn diagnostics_batch_interval(mut self, interval: Duration) -> Self {
        self.config.diagnostics_batch_interval = interval;
        self
    }

    pub fn diagnostics_max_batch_size(mut self, size: usize) -> Self {
        self.config.diagnostics_max_batch_size = size;
        self
    }

    pub fn diagnostics_health_interval(mut self, interval: Duration) -> Self {
        self.config.diagnostics_health_interval = interval;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    pub fn auto_optimization_threshold(mut self, threshold: u64) -> Self {
        self.config.auto_optimization_threshold = threshold;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_is_clamped() {
        let config = Config::builder()
            .optimization_debounce(Duration::from_millis(5))
            .build();
        assert_eq!(config.optimization_debounce, Duration::from_millis(50));

        let config = Config::builder()
            .optimization_debounce(Duration::from_millis(5000))
            .build();
        assert_eq!(config.optimization_debounce, Duration::from_millis(1000));
    }

    #[test]
    fn defaults_match_build_profile() {
        let config = Config::default();
        assert_eq!(config.optimization_enabled, false);
        assert_eq!(config.auto_optimization_threshold, 10);
    }

    #[test]
    fn log_format_env_override_is_applied() {
        // SAFETY: test-only process-wide env mutation, no concurrent access
        // to this variable from other tests in this crate.
        unsafe {
            std::env::set_var("COREWIRE_LOG_FORMAT", "compact");
        }
        let config = Config::from_env();
        assert_eq!(config.log_format, LogFormat::Compact);
        unsafe {
            std::env::remove_var("COREWIRE_LOG_FORMAT");
        }
    }

    #[test]
    fn from_env_ignores_malformed_values() {
        // SAFETY: test-only process-wide env mutation, no concurrent access
        // to this variable from other tests in this crate.
        unsafe {
            std::env::set_var("COREWIRE_OPTIMIZATION_DEBOUNCE_MS", "not-a-number");
        }
        let config = Config::from_env();
        assert_eq!(config.optimization_debounce, Duration::from_millis(100));
        unsafe {
            std::env::remove_var("COREWIRE_OPTIMIZATION_DEBOUNCE_MS");
        }
    }
}

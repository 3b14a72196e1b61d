//! Scheduler configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder methods
//! 2. Environment variables (runtime, via `from_env`)
//! 3. User's config file named by `STRAND_CONFIG_RS` (compile-time)
//! 4. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use strand_runtime::config::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_env()
//!     .stack_size(512 * 1024)
//!     .listen_backlog(1024);
//! ```

pub mod defaults;

use strand_core::constants::{MIN_STACK_SIZE, PAGE_SIZE};
use strand_core::env::{env_get, env_get_bool};
use strand_core::{kprintln, SchedError};

/// Scheduler configuration with builder pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Usable stack bytes per fiber (guard excluded)
    pub stack_size: usize,
    /// Inaccessible bytes below each stack; 0 disables the guard
    pub guard_size: usize,
    /// Backlog passed to `listen(2)` by `Scheduler::listen`
    pub listen_backlog: i32,
    /// Reactor event buffer size
    pub max_events: usize,
    /// Raise the log level to debug at scheduler creation
    pub debug_logging: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SchedulerConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `STRAND_STACK_SIZE` - Stack bytes per fiber
    /// - `STRAND_GUARD_SIZE` - Guard bytes per fiber
    /// - `STRAND_LISTEN_BACKLOG` - listen(2) backlog
    /// - `STRAND_MAX_EVENTS` - Reactor event buffer size
    /// - `STRAND_DEBUG` - Enable debug logging (0/1, true/false)
    pub fn from_env() -> Self {
        Self {
            stack_size: env_get("STRAND_STACK_SIZE", defaults::STACK_SIZE),
            guard_size: env_get("STRAND_GUARD_SIZE", defaults::GUARD_SIZE),
            listen_backlog: env_get("STRAND_LISTEN_BACKLOG", defaults::LISTEN_BACKLOG),
            max_events: env_get("STRAND_MAX_EVENTS", defaults::MAX_EVENTS),
            debug_logging: env_get_bool("STRAND_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Create config with compile-time defaults only (no env override).
    pub fn new() -> Self {
        Self {
            stack_size: defaults::STACK_SIZE,
            guard_size: defaults::GUARD_SIZE,
            listen_backlog: defaults::LISTEN_BACKLOG,
            max_events: defaults::MAX_EVENTS,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn guard_size(mut self, size: usize) -> Self {
        self.guard_size = size;
        self
    }

    pub fn listen_backlog(mut self, backlog: i32) -> Self {
        self.listen_backlog = backlog;
        self
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 16KB"));
        }
        if self.guard_size % PAGE_SIZE != 0 {
            return Err(ConfigError::InvalidValue(
                "guard_size must be a multiple of the page size",
            ));
        }
        if self.listen_backlog <= 0 {
            return Err(ConfigError::InvalidValue("listen_backlog must be > 0"));
        }
        if self.max_events == 0 {
            return Err(ConfigError::InvalidValue("max_events must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("strand configuration:");
        kprintln!("  stack_size:      {}", self.stack_size);
        kprintln!("  guard_size:      {}", self.guard_size);
        kprintln!("  listen_backlog:  {}", self.listen_backlog);
        kprintln!("  max_events:      {}", self.max_events);
        kprintln!("  debug_logging:   {}", self.debug_logging);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for SchedError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => SchedError::InvalidConfig(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SchedulerConfig::new().validate().is_ok());
        assert!(SchedulerConfig::from_env().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SchedulerConfig::new()
            .stack_size(1024 * 1024)
            .guard_size(2 * PAGE_SIZE)
            .listen_backlog(1024)
            .max_events(64)
            .debug_logging(true);

        assert_eq!(config.stack_size, 1024 * 1024);
        assert_eq!(config.guard_size, 2 * PAGE_SIZE);
        assert_eq!(config.listen_backlog, 1024);
        assert_eq!(config.max_events, 64);
        assert!(config.debug_logging);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = SchedulerConfig::new().stack_size(1024);
        assert!(config.validate().is_err());

        let config = SchedulerConfig::new().guard_size(PAGE_SIZE + 1);
        assert!(config.validate().is_err());

        let config = SchedulerConfig::new().guard_size(0);
        assert!(config.validate().is_ok());

        let config = SchedulerConfig::new().listen_backlog(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue("listen_backlog must be > 0"))
        );
    }

    #[test]
    fn test_into_sched_error() {
        let err: SchedError = ConfigError::InvalidValue("max_events must be > 0").into();
        assert_eq!(err, SchedError::InvalidConfig("max_events must be > 0"));
    }
}

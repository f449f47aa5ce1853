//! Configuration management for rtdelegate
//!
//! Settings are loaded from environment variables with sensible defaults.
//! They control which toolchain binaries delegates launch and how long the
//! process supervisor and discovery probe wait.
//!
//! # Environment Variables
//!
//! - `RTDELEGATE_NODE_BIN`: Node.js executable - default: "node"
//! - `RTDELEGATE_PYTHON_BIN`: Python interpreter used when no venv exists - default: "python3"
//! - `RTDELEGATE_DART_BIN`: Dart executable - default: "dart"
//! - `RTDELEGATE_GRACE_PERIOD_MS`: Wait after a cooperative shutdown before killing - default: "10000"
//! - `RTDELEGATE_DISCOVERY_TIMEOUT_MS`: How long live discovery waits for an answer - default: "10000"
//! - `RTDELEGATE_BASE_PORT`: First port tried by the port finder - default: "8081"
//! - `RTDELEGATE_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use runtime_delegates::DelegateConfig;
//!
//! let config = DelegateConfig::default();
//! config.validate().expect("Invalid configuration");
//! ```

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_NODE_BIN: &str = "node";
const DEFAULT_PYTHON_BIN: &str = "python3";
const DEFAULT_DART_BIN: &str = "dart";
const DEFAULT_GRACE_PERIOD_MS: u64 = 10_000;
const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_BASE_PORT: u16 = 8081;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone)]
pub struct DelegateConfig {
    pub node_bin: PathBuf,
    pub python_bin: PathBuf,
    pub dart_bin: PathBuf,

    /// Wait between the cooperative shutdown request and a forced kill
    pub grace_period: Duration,

    /// Upper bound for one live discovery probe
    pub discovery_timeout: Duration,

    pub base_port: u16,

    pub log_level: String,
}

impl Default for DelegateConfig {
    /// Loads `RTDELEGATE_*` variables, falling back to defaults for missing
    /// or unparseable values.
    fn default() -> Self {
        let node_bin = env::var("RTDELEGATE_NODE_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_NODE_BIN));
        let python_bin = env::var("RTDELEGATE_PYTHON_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PYTHON_BIN));
        let dart_bin = env::var("RTDELEGATE_DART_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DART_BIN));

        let grace_period_ms = env::var("RTDELEGATE_GRACE_PERIOD_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_GRACE_PERIOD_MS);

        let discovery_timeout_ms = env::var("RTDELEGATE_DISCOVERY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DISCOVERY_TIMEOUT_MS);

        let base_port = env::var("RTDELEGATE_BASE_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_BASE_PORT);

        let log_level = env::var("RTDELEGATE_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            node_bin,
            python_bin,
            dart_bin,
            grace_period: Duration::from_millis(grace_period_ms),
            discovery_timeout: Duration::from_millis(discovery_timeout_ms),
            base_port,
            log_level,
        }
    }
}

impl DelegateConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` if any value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grace_period.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "Grace period must be greater than zero".to_string(),
            ));
        }
        if self.grace_period > Duration::from_secs(60) {
            return Err(ConfigError::ValidationFailed(
                "Grace period cannot exceed 60 seconds".to_string(),
            ));
        }
        if self.discovery_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "Discovery timeout must be greater than zero".to_string(),
            ));
        }
        if self.base_port < 1024 {
            return Err(ConfigError::ValidationFailed(format!(
                "Base port {} is privileged; use 1024 or above",
                self.base_port
            )));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_dart_bin(mut self, dart_bin: impl Into<PathBuf>) -> Self {
        self.dart_bin = dart_bin.into();
        self
    }

    pub fn with_node_bin(mut self, node_bin: impl Into<PathBuf>) -> Self {
        self.node_bin = node_bin.into();
        self
    }

    pub fn with_python_bin(mut self, python_bin: impl Into<PathBuf>) -> Self {
        self.python_bin = python_bin.into();
        self
    }
}

impl fmt::Display for DelegateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rtdelegate Configuration:")?;
        writeln!(f, "  Node: {}", self.node_bin.display())?;
        writeln!(f, "  Python: {}", self.python_bin.display())?;
        writeln!(f, "  Dart: {}", self.dart_bin.display())?;
        writeln!(f, "  Grace Period: {}ms", self.grace_period.as_millis())?;
        writeln!(
            f,
            "  Discovery Timeout: {}ms",
            self.discovery_timeout.as_millis()
        )?;
        writeln!(f, "  Base Port: {}", self.base_port)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Temporarily sets an environment variable, restoring it on drop
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::unset("RTDELEGATE_NODE_BIN"),
            EnvGuard::unset("RTDELEGATE_GRACE_PERIOD_MS"),
            EnvGuard::unset("RTDELEGATE_DISCOVERY_TIMEOUT_MS"),
            EnvGuard::unset("RTDELEGATE_BASE_PORT"),
            EnvGuard::unset("RTDELEGATE_LOG_LEVEL"),
        ];

        let config = DelegateConfig::default();

        assert_eq!(config.node_bin, PathBuf::from(DEFAULT_NODE_BIN));
        assert_eq!(config.grace_period, Duration::from_millis(DEFAULT_GRACE_PERIOD_MS));
        assert_eq!(
            config.discovery_timeout,
            Duration::from_millis(DEFAULT_DISCOVERY_TIMEOUT_MS)
        );
        assert_eq!(config.base_port, DEFAULT_BASE_PORT);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("RTDELEGATE_DART_BIN", "/opt/dart/bin/dart"),
            EnvGuard::set("RTDELEGATE_GRACE_PERIOD_MS", "2500"),
            EnvGuard::set("RTDELEGATE_BASE_PORT", "9000"),
            EnvGuard::set("RTDELEGATE_LOG_LEVEL", "DEBUG"),
        ];

        let config = DelegateConfig::default();

        assert_eq!(config.dart_bin, PathBuf::from("/opt/dart/bin/dart"));
        assert_eq!(config.grace_period, Duration::from_millis(2500));
        assert_eq!(config.base_port, 9000);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let _guards = vec![
            EnvGuard::set("RTDELEGATE_GRACE_PERIOD_MS", "soon"),
            EnvGuard::set("RTDELEGATE_BASE_PORT", "70000"),
        ];

        let config = DelegateConfig::default();

        assert_eq!(config.grace_period, Duration::from_millis(DEFAULT_GRACE_PERIOD_MS));
        assert_eq!(config.base_port, DEFAULT_BASE_PORT);
    }

    #[test]
    #[serial]
    fn test_validation_rejects_zero_grace_period() {
        let config = DelegateConfig::default().with_grace_period(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    #[serial]
    fn test_validation_rejects_privileged_port() {
        let mut config = DelegateConfig::default();
        config.base_port = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_validation_rejects_bad_log_level() {
        let mut config = DelegateConfig::default();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_display() {
        let display = format!("{}", DelegateConfig::default());
        assert!(display.contains("rtdelegate Configuration:"));
        assert!(display.contains("Grace Period"));
    }
}

//! Structured logging setup for rtdelegate
//!
//! Initializes a `tracing` subscriber once per process. Subprocess output is
//! forwarded through the same subscriber, so filtering on
//! `runtime_delegates=debug` also shows child stdout.
//!
//! # Example
//!
//! ```no_run
//! use runtime_delegates::util::logging;
//!
//! // Reads RTDELEGATE_LOG_LEVEL and RTDELEGATE_LOG_JSON
//! logging::init_from_env();
//!
//! tracing::info!(source = "functions/", "discovering triggers");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Crate target used for the default filter directive
const CRATE_TARGET: &str = "runtime_delegates";

/// Noisy HTTP client internals, quieted unless `RUST_LOG` says otherwise
const QUIET_TARGETS: &[&str] = &["h2", "hyper", "hyper_util", "reqwest"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,

    /// JSON lines instead of console formatting
    pub use_json: bool,

    pub include_target: bool,

    /// File and line number of the log call
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with targets and locations, for CI logs
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
        }
    }
}

/// Parses a log level from a string
///
/// Case-insensitive; anything unrecognized becomes `Level::INFO`.
///
/// ```
/// use runtime_delegates::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("WARN"), Level::WARN);
/// assert_eq!(parse_level("loud"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if env::var("RUST_LOG").is_ok() {
        return filter;
    }

    if let Ok(directive) = format!("{}={}", CRATE_TARGET, level).parse() {
        filter = filter.add_directive(directive);
    }
    for target in QUIET_TARGETS {
        if let Ok(directive) = format!("{}=warn", target).parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs the global subscriber. Only the first call has any effect.
///
/// Logs go to stderr so stdout stays clean for `--format json|yaml`.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Initializes logging from environment variables
///
/// - `RTDELEGATE_LOG_LEVEL`: trace, debug, info, warn, error
/// - `RTDELEGATE_LOG_JSON`: `true` for JSON lines
/// - `RUST_LOG`: overrides the default filter entirely
pub fn init_from_env() {
    let level_str = env::var("RTDELEGATE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    init_logging(config_from_env(&level_str));
}

/// Logging config for `level_str`, with the JSON flag read from `RTDELEGATE_LOG_JSON`
pub fn config_from_env(level_str: &str) -> LoggingConfig {
    let use_json = env::var("RTDELEGATE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig {
        level: parse_level(level_str),
        use_json,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(!config.include_location);
    }

    #[test]
    fn test_production_config() {
        let config = LoggingConfig::production();
        assert!(config.use_json);
        assert!(config.include_target);
        assert!(config.include_location);
    }

    #[test]
    #[serial]
    fn test_config_from_env_reads_json_flag() {
        env::set_var("RTDELEGATE_LOG_JSON", "true");
        let config = config_from_env("debug");
        env::remove_var("RTDELEGATE_LOG_JSON");

        assert!(config.use_json);
        assert_eq!(config.level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_from_env_ignores_garbage_json_flag() {
        env::set_var("RTDELEGATE_LOG_JSON", "yes please");
        let config = config_from_env("info");
        env::remove_var("RTDELEGATE_LOG_JSON");

        assert!(!config.use_json);
    }
}

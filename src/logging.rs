//! Structured logging setup.
//!
//! Logs go to stderr so stdout stays free for command output such as
//! `analyze --json`. `RUST_LOG` is respected; otherwise the crate logs at the
//! configured level and HTTP internals at warn.

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming the default log level
pub const LOG_LEVEL_ENV: &str = "FLOWSCRIBE_LOG_LEVEL";

static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// One JSON object per event
    pub use_json: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            use_json: false,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Level from CLI flags: an explicit level wins, then `-q`, then `-v`,
    /// then `FLOWSCRIBE_LOG_LEVEL`
    pub fn from_flags(level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        let level = match level {
            Some(name) => parse_level(name),
            None if quiet => Level::ERROR,
            None if verbose => Level::DEBUG,
            None => env::var(LOG_LEVEL_ENV)
                .ok()
                .map(|name| parse_level(&name))
                .unwrap_or(Level::WARN),
        };
        Self::with_level(level)
    }

    pub fn json(mut self, use_json: bool) -> Self {
        self.use_json = use_json;
        self
    }
}

/// Parse a level name, falling back to INFO
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
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

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let own = format!("flowscribe={}", config.level.as_str().to_ascii_lowercase());
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = own.parse() {
        filter = filter.add_directive(directive);
    }

    if env::var("RUST_LOG").is_err() {
        for quiet in ["h2=warn", "hyper=warn", "hyper_util=warn", "reqwest=warn"] {
            if let Ok(directive) = quiet.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(&config);
        let result = if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target),
                )
                .try_init()
        };
        if let Err(e) = result {
            eprintln!("Logging already initialized: {}", e);
        }
    });
}

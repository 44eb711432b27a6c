//! Tracing setup shared by the watchdog binaries.
//!
//! Verbosity follows `RUST_LOG` when set, otherwise the level passed in.
//! `WATCHDOG_LOG_FORMAT` picks the output: `json`, `pretty` or `compact`
//! (the default).

use std::env::var;
use std::str::FromStr;

pub use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FORMAT_VAR: &str = "WATCHDOG_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

impl LogFormat {
    /// Format named by `WATCHDOG_LOG_FORMAT`, compact when unset or invalid
    pub fn from_env() -> Self {
        var(LOG_FORMAT_VAR).ok().and_then(|raw| raw.parse().ok()).unwrap_or_default()
    }
}

pub fn init() {
    init_with_level(LevelFilter::INFO);
}

/// Install the global subscriber. Later calls leave the first one in place.
pub fn init_with_level(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    // Logs go to stderr so reports on stdout stay machine readable
    let layer = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
    };

    if let Err(error) = tracing_subscriber::registry().with(layer).try_init() {
        warn!("Tracing already initialized: {error}");
    }
}

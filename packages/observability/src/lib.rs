//! # Observability
//!
//! Structured logging for sendhooks services.
//!
//! Services call `observability::init()` once at startup and use standard
//! `tracing` macros everywhere else. Every event is written as one JSON
//! object per line to a file named after the current UTC date:
//!
//! ```text
//! <log_dir>/2026-10-19.jsonl
//! ```
//!
//! The writer moves to a new file when the date changes, so each file
//! holds exactly one day of logs. `tail -f logs/$(date -u +%F).jsonl | jq`
//! follows the running process.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() -> std::io::Result<()> {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "sendhooks".into(),
//!         default_level: "debug".into(),
//!         log_dir: Some("logs".into()),
//!         also_stderr: true,
//!     })?;
//!     tracing::info!("service started");
//!     Ok(())
//! }
//! ```

mod file;
mod json_layer;

pub use file::{log_file_name, DailyLogWriter};
pub use json_layer::{JsonLayer, LogEntry};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Directory receiving the daily log files.
    /// Defaults to `<data dir>/sendhooks/logs`.
    pub log_dir: Option<PathBuf>,

    /// Also emit human-readable logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_dir: None,
            also_stderr: false,
        }
    }
}

impl LogConfig {
    /// The configured log directory, or the platform default.
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(default_log_dir)
    }
}

/// `<data dir>/sendhooks/logs`, falling back to `./logs`.
fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sendhooks").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Initialize logging with default settings for `service_name`.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Install the global subscriber described by `config`.
///
/// Fails if the log directory cannot be created or today's file cannot
/// be opened, or if a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let log_dir = config.resolved_log_dir();
    let writer = DailyLogWriter::new(&log_dir)?;

    let json_layer = JsonLayer::new(config.service_name.clone(), writer);

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter(&config.default_level)))
        .with(stderr_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;

    tracing::debug!(
        log_dir = %log_dir.display(),
        "observability initialized"
    );
    Ok(())
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

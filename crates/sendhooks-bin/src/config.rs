//! Process configuration.
//!
//! Sources, later wins: built-in defaults, the JSON config file, then
//! environment variables and CLI flags (merged by clap into [`Overrides`]).

use anyhow::{bail, Context, Result};
use observability::LogConfig;
use sendhooks_core::config::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_IN_FLIGHT, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_STATUS_STREAM,
};
use sendhooks_core::{AckPolicy, DeliveryConfig, RetryPolicy, DEFAULT_SECRET_HASH_HEADER};
use sendhooks_redis::{RedisQueueConfig, RedisTlsConfig, DEFAULT_REDIS_ADDRESS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Stream read when none is configured.
pub const DEFAULT_STREAM_NAME: &str = "hooks";

pub const SERVICE_NAME: &str = "sendhooks";

/// Supported queue backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broker {
    Redis,
}

impl FromStr for Broker {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Broker::Redis),
            other => bail!("unsupported broker: {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub broker: String,
    pub secret_hash_header_name: String,
    pub redis: RedisSection,
    pub delivery: DeliverySection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisSection {
    pub redis_address: String,
    pub redis_password: String,
    pub redis_db: i64,
    pub redis_ssl: bool,
    pub redis_ca_cert: String,
    pub redis_client_cert: String,
    pub redis_client_key: String,
    pub redis_stream_name: String,
    pub redis_stream_status_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySection {
    pub channel_capacity: usize,
    pub max_in_flight: usize,
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub ack_policy: AckPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub dir: PathBuf,
    pub stderr: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker: "redis".to_string(),
            secret_hash_header_name: DEFAULT_SECRET_HASH_HEADER.to_string(),
            redis: RedisSection::default(),
            delivery: DeliverySection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            redis_address: DEFAULT_REDIS_ADDRESS.to_string(),
            redis_password: String::new(),
            redis_db: 0,
            redis_ssl: false,
            redis_ca_cert: String::new(),
            redis_client_cert: String::new(),
            redis_client_key: String::new(),
            redis_stream_name: DEFAULT_STREAM_NAME.to_string(),
            redis_stream_status_name: DEFAULT_STATUS_STREAM.to_string(),
        }
    }
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            ack_policy: AckPolicy::default(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: PathBuf::from("logs"),
            stderr: true,
        }
    }
}

/// Values taken from the environment or the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub redis_address: Option<String>,
    pub redis_password: Option<String>,
    pub stream_name: Option<String>,
    pub status_stream_name: Option<String>,
    pub max_in_flight: Option<usize>,
    pub ack_after_outcome: bool,
}

impl AppConfig {
    /// Load `path`, which must exist.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(dir) = overrides.log_dir {
            self.logging.dir = dir;
        }
        if let Some(address) = overrides.redis_address {
            self.redis.redis_address = address;
        }
        if let Some(password) = overrides.redis_password {
            self.redis.redis_password = password;
        }
        if let Some(stream) = overrides.stream_name {
            self.redis.redis_stream_name = stream;
        }
        if let Some(stream) = overrides.status_stream_name {
            self.redis.redis_stream_status_name = stream;
        }
        if let Some(max) = overrides.max_in_flight {
            self.delivery.max_in_flight = max;
        }
        if overrides.ack_after_outcome {
            self.delivery.ack_policy = AckPolicy::AfterOutcome;
        }
    }

    pub fn broker(&self) -> Result<Broker> {
        self.broker.parse()
    }

    /// Check everything that can be checked before connecting.
    pub fn validate(&self) -> Result<()> {
        self.broker()?;
        self.delivery_config()
            .validate()
            .context("invalid delivery settings")?;
        self.redis_config()
            .validate()
            .context("invalid redis settings")?;
        Ok(())
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            status_stream: self.redis.redis_stream_status_name.clone(),
            secret_hash_header: self.secret_hash_header_name.clone(),
            channel_capacity: self.delivery.channel_capacity,
            max_in_flight: self.delivery.max_in_flight,
            retry: RetryPolicy {
                max_attempts: self.delivery.max_attempts,
                ..Default::default()
            },
            request_timeout: Duration::from_secs(self.delivery.request_timeout_secs),
            ack_policy: self.delivery.ack_policy,
            ..Default::default()
        }
    }

    pub fn redis_config(&self) -> RedisQueueConfig {
        let redis = &self.redis;
        let tls = redis.redis_ssl.then(|| RedisTlsConfig {
            ca_cert: PathBuf::from(&redis.redis_ca_cert),
            client_cert: non_empty(&redis.redis_client_cert).map(PathBuf::from),
            client_key: non_empty(&redis.redis_client_key).map(PathBuf::from),
        });

        RedisQueueConfig {
            address: redis.redis_address.clone(),
            password: non_empty(&redis.redis_password).map(str::to_string),
            db: redis.redis_db,
            tls,
            stream_name: redis.redis_stream_name.clone(),
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            service_name: SERVICE_NAME.to_string(),
            default_level: self.logging.level.clone(),
            log_dir: Some(self.logging.dir.clone()),
            also_stderr: self.logging.stderr,
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

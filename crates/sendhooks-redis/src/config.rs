//! Connection settings for the Redis adapter.

use crate::error::{RedisQueueError, RedisQueueResult};
use std::path::PathBuf;
use url::Url;

/// Address used when none is configured.
pub const DEFAULT_REDIS_ADDRESS: &str = "localhost:6379";

const DEFAULT_REDIS_PORT: u16 = 6379;

/// Certificate material for `rediss://` connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedisTlsConfig {
    /// CA bundle used to verify the server. Required.
    pub ca_cert: PathBuf,
    /// Client certificate for mutual TLS. Requires `client_key`.
    pub client_cert: Option<PathBuf>,
    /// Client private key for mutual TLS. Requires `client_cert`.
    pub client_key: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisQueueConfig {
    /// `host:port`; the port defaults to 6379.
    pub address: String,
    pub password: Option<String>,
    pub db: i64,
    /// Enables TLS when set.
    pub tls: Option<RedisTlsConfig>,
    /// Stream carrying webhook requests.
    pub stream_name: String,
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_REDIS_ADDRESS.to_string(),
            password: None,
            db: 0,
            tls: None,
            stream_name: String::new(),
        }
    }
}

impl RedisQueueConfig {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> RedisQueueResult<()> {
        if self.stream_name.trim().is_empty() {
            return Err(RedisQueueError::Config(
                "stream name must not be empty".to_string(),
            ));
        }
        if self.db < 0 {
            return Err(RedisQueueError::Config(format!(
                "database index must not be negative: {}",
                self.db
            )));
        }
        split_address(&self.address)?;
        Ok(())
    }

    /// Connection URL, `rediss://` when TLS is configured.
    pub fn connection_url(&self) -> RedisQueueResult<Url> {
        let (host, port) = split_address(&self.address)?;
        let scheme = if self.tls.is_some() { "rediss" } else { "redis" };

        let mut url = Url::parse(&format!("{scheme}://{host}:{port}/{}", self.db))
            .map_err(|e| RedisQueueError::Config(format!("invalid redis address {:?}: {e}", self.address)))?;

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|()| RedisQueueError::Config("cannot set password on redis url".to_string()))?;
        }
        Ok(url)
    }

    /// Address with any password elided, for logs.
    pub fn display_address(&self) -> String {
        let scheme = if self.tls.is_some() { "rediss" } else { "redis" };
        format!("{scheme}://{}/{}", self.address, self.db)
    }
}

/// Split `host[:port]`, accepting bracketed IPv6 hosts.
pub(crate) fn split_address(address: &str) -> RedisQueueResult<(String, u16)> {
    let address = address.trim();
    if address.is_empty() {
        return Err(RedisQueueError::Config("redis address must not be empty".to_string()));
    }

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| RedisQueueError::Config(format!("unterminated IPv6 address: {address}")))?;
        (format!("[{host}]"), tail.strip_prefix(':'))
    } else {
        match address.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (address.to_string(), None),
        }
    };

    if host.is_empty() || host == "[]" {
        return Err(RedisQueueError::Config(format!("missing host in redis address: {address}")));
    }

    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| RedisQueueError::Config(format!("invalid port in redis address: {address}")))?,
        None => DEFAULT_REDIS_PORT,
    };
    Ok((host, port))
}

//! Error types for the Redis adapter.

use sendhooks_core::QueueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedisQueueError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Certificate material could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// IO error (certificate files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid adapter configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reply shape did not match the command
    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type RedisQueueResult<T> = Result<T, RedisQueueError>;

impl RedisQueueError {
    /// True when the link to the server is gone rather than a command failing.
    pub fn is_connection_error(&self) -> bool {
        match self {
            RedisQueueError::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            RedisQueueError::Io(_) => true,
            _ => false,
        }
    }
}

impl From<RedisQueueError> for QueueError {
    fn from(err: RedisQueueError) -> Self {
        if err.is_connection_error() {
            QueueError::Connection(err.to_string())
        } else {
            QueueError::Operation(err.to_string())
        }
    }
}

//! Configuration consumed by the delivery pipeline.

use crate::backoff::{BackoffPolicy, INITIAL_BACKOFF, MAX_BACKOFF};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying `secretHash` when no name is configured.
pub const DEFAULT_SECRET_HASH_HEADER: &str = "X-Secret-Hash";

/// Status stream used when none is configured.
pub const DEFAULT_STATUS_STREAM: &str = "webhook-status-updates";

/// Bounded intake channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Entries requested per broker read.
pub const DEFAULT_READ_BATCH_SIZE: usize = 5;

/// Idle sleep when the broker has nothing new.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Ceiling on concurrently running delivery sequences.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 50;

/// Attempts per payload before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Per-attempt HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// When a broker entry is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AckPolicy {
    /// At handoff into the intake channel. A crash before the outcome is
    /// reported loses the message.
    #[default]
    OnAdmission,
    /// After the terminal outcome has been handed to the status reporter.
    /// A crash mid-delivery leaves the entry in the broker.
    AfterOutcome,
}

/// Bounded retries with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: INITIAL_BACKOFF,
            max_delay: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: self.initial_delay,
            max: self.max_delay,
        }
    }
}

/// Delivery pipeline configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Stream receiving delivery outcomes.
    pub status_stream: String,
    /// Name of the signing header.
    pub secret_hash_header: String,
    pub channel_capacity: usize,
    pub read_batch_size: usize,
    pub poll_interval: Duration,
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub ack_policy: AckPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            status_stream: DEFAULT_STATUS_STREAM.to_string(),
            secret_hash_header: DEFAULT_SECRET_HASH_HEADER.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            read_batch_size: DEFAULT_READ_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ack_policy: AckPolicy::default(),
        }
    }
}

impl DeliveryConfig {
    /// Signing header name, falling back to `X-Secret-Hash` when unset.
    pub fn secret_hash_header(&self) -> &str {
        if self.secret_hash_header.trim().is_empty() {
            DEFAULT_SECRET_HASH_HEADER
        } else {
            &self.secret_hash_header
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.status_stream.trim().is_empty() {
            return Err(CoreError::Config("status stream must not be empty".into()));
        }
        if self.channel_capacity == 0 {
            return Err(CoreError::Config("channel capacity must be at least 1".into()));
        }
        if self.read_batch_size == 0 {
            return Err(CoreError::Config("read batch size must be at least 1".into()));
        }
        if self.max_in_flight == 0 {
            return Err(CoreError::Config("max in-flight must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::Config("max attempts must be at least 1".into()));
        }
        Ok(())
    }
}

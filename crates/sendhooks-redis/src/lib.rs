//! Redis Streams adapter for the sendhooks [`Queue`](sendhooks_core::Queue).
//!
//! Webhook requests are read from one stream with `XREAD` from a local
//! cursor, acknowledged with `XDEL`, and outcomes are appended to the
//! status stream with `XADD <stream> * data <record>`.

pub mod config;
pub mod error;
pub mod queue;
pub mod tls;

pub use config::{RedisQueueConfig, RedisTlsConfig, DEFAULT_REDIS_ADDRESS};
pub use error::{RedisQueueError, RedisQueueResult};
pub use queue::RedisStreamQueue;

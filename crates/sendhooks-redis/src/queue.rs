//! Redis Streams implementation of the pipeline [`Queue`].
//!
//! Reads with `XREAD COUNT n STREAMS <stream> <cursor>`; the cursor lives
//! in the adapter, starts at `0` and moves past every returned entry.

use crate::config::RedisQueueConfig;
use crate::error::{RedisQueueError, RedisQueueResult};
use crate::tls::load_certificates;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Value};
use sendhooks_core::{Queue, QueueEntry, QueueResult};
use tracing::{debug, info, warn};

/// Field holding the JSON document in every stream entry.
pub const DATA_FIELD: &str = "data";

/// Cursor for a fresh adapter: the start of the stream.
const INITIAL_CURSOR: &str = "0";

pub struct RedisStreamQueue {
    client: Client,
    conn: Mutex<MultiplexedConnection>,
    stream: String,
    cursor: tokio::sync::Mutex<String>,
}

impl RedisStreamQueue {
    /// Open a client for `config` and establish the multiplexed connection.
    pub async fn connect(config: RedisQueueConfig) -> RedisQueueResult<Self> {
        config.validate()?;
        let url = config.connection_url()?;

        let client = match &config.tls {
            Some(tls) => Client::build_with_tls(url.as_str(), load_certificates(tls)?)?,
            None => Client::open(url.as_str())?,
        };
        let conn = client.get_multiplexed_async_connection().await?;

        info!(
            address = %config.display_address(),
            stream = %config.stream_name,
            tls = config.tls.is_some(),
            "Connected to Redis"
        );

        Ok(Self {
            client,
            conn: Mutex::new(conn),
            stream: config.stream_name,
            cursor: tokio::sync::Mutex::new(INITIAL_CURSOR.to_string()),
        })
    }

    /// Replace the multiplexed connection. The read cursor is kept.
    pub async fn reconnect(&self) -> RedisQueueResult<()> {
        info!("Reconnecting to Redis...");
        let conn = self.client.get_multiplexed_async_connection().await?;
        *self.conn.lock() = conn;
        Ok(())
    }

    fn connection(&self) -> MultiplexedConnection {
        self.conn.lock().clone()
    }

    /// Reconnect after `err` when it means the link is gone.
    ///
    /// Returns the error back when it is not a connection error, or when
    /// reconnecting fails.
    async fn recover(&self, err: RedisQueueError) -> RedisQueueResult<()> {
        if !err.is_connection_error() {
            return Err(err);
        }
        warn!(error = %err, "Redis connection lost");
        self.reconnect().await
    }

    async fn read_batch(&self, max_count: usize) -> RedisQueueResult<Vec<QueueEntry>> {
        // Held across the round trip so concurrent readers never share a cursor position.
        let mut cursor = self.cursor.lock().await;

        // XREAD has no side effects, so one retry on a fresh connection is safe.
        let reply = match self.xread(&cursor, max_count).await {
            Ok(reply) => reply,
            Err(e) => {
                self.recover(e).await?;
                self.xread(&cursor, max_count).await?
            }
        };

        let entries = parse_xread_reply(reply)?;
        if let Some(last) = entries.last() {
            *cursor = last.entry_id.clone();
            debug!(
                stream = %self.stream,
                count = entries.len(),
                cursor = %cursor,
                "Read stream entries"
            );
        }
        Ok(entries)
    }

    async fn xread(&self, cursor: &str, max_count: usize) -> RedisQueueResult<Value> {
        let reply = redis::cmd("XREAD")
            .arg("COUNT")
            .arg(max_count.max(1))
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(cursor)
            .query_async(&mut self.connection())
            .await?;
        Ok(reply)
    }

    async fn delete(&self, entry_id: &str) -> RedisQueueResult<()> {
        // XDEL is idempotent; retried once on a fresh connection.
        let removed = match self.xdel(entry_id).await {
            Ok(removed) => removed,
            Err(e) => {
                self.recover(e).await?;
                self.xdel(entry_id).await?
            }
        };

        if removed == 1 {
            debug!(entry_id = %entry_id, stream = %self.stream, "Deleted entry");
        } else {
            warn!(
                entry_id = %entry_id,
                stream = %self.stream,
                "XDEL returned {}, entry may not exist",
                removed
            );
        }
        Ok(())
    }

    async fn xdel(&self, entry_id: &str) -> RedisQueueResult<i64> {
        let removed: i64 = self
            .connection()
            .xdel(&self.stream, &[entry_id])
            .await?;
        Ok(removed)
    }

    /// XADD once. A lost connection is replaced for later calls but the
    /// record is not re-sent, since the first XADD may have been applied.
    async fn append(&self, stream: &str, record: &str) -> RedisQueueResult<String> {
        let result: Result<String, redis::RedisError> = self
            .connection()
            .xadd(stream, "*", &[(DATA_FIELD, record)])
            .await;

        match result {
            Ok(id) => Ok(id),
            Err(e) => {
                let err = RedisQueueError::from(e);
                if err.is_connection_error() {
                    if let Err(reconnect) = self.reconnect().await {
                        warn!(error = %reconnect, "Reconnect after failed publish did not succeed");
                    }
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Queue for RedisStreamQueue {
    async fn read_next(&self, max_count: usize) -> QueueResult<Vec<QueueEntry>> {
        Ok(self.read_batch(max_count).await?)
    }

    async fn acknowledge(&self, entry_id: &str) -> QueueResult<()> {
        Ok(self.delete(entry_id).await?)
    }

    async fn publish(&self, stream: &str, record: &str) -> QueueResult<()> {
        let id = self.append(stream, record).await?;
        debug!(stream = %stream, entry_id = %id, "Published record");
        Ok(())
    }
}

/// Decode an `XREAD` reply for a single stream.
///
/// ```text
/// [[stream_key, [[entry_id, [field1, value1, ...]], ...]]]
/// ```
///
/// RESP3 servers may answer with maps instead of the outer and field
/// arrays; both shapes are accepted. `Nil` means no new entries.
pub fn parse_xread_reply(value: Value) -> RedisQueueResult<Vec<QueueEntry>> {
    let streams = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Array(streams) => streams
            .into_iter()
            .map(|stream| match stream {
                Value::Array(mut pair) if pair.len() >= 2 => Ok(pair.swap_remove(1)),
                other => Err(RedisQueueError::Protocol(format!(
                    "expected [stream, entries] pair, got {other:?}"
                ))),
            })
            .collect::<RedisQueueResult<Vec<_>>>()?,
        Value::Map(streams) => streams.into_iter().map(|(_, entries)| entries).collect(),
        other => {
            return Err(RedisQueueError::Protocol(format!(
                "unexpected XREAD reply type: {other:?}"
            )))
        }
    };

    let mut out = Vec::new();
    for entries in streams {
        let entries = match entries {
            Value::Array(entries) => entries,
            Value::Nil => continue,
            other => {
                return Err(RedisQueueError::Protocol(format!(
                    "expected array of entries, got {other:?}"
                )))
            }
        };
        for entry in entries {
            out.push(parse_entry(entry)?);
        }
    }
    Ok(out)
}

fn parse_entry(entry: Value) -> RedisQueueResult<QueueEntry> {
    let mut parts = match entry {
        Value::Array(parts) if parts.len() >= 2 => parts.into_iter(),
        other => {
            return Err(RedisQueueError::Protocol(format!(
                "expected [id, fields] entry, got {other:?}"
            )))
        }
    };

    let entry_id = parts
        .next()
        .as_ref()
        .and_then(as_string)
        .ok_or_else(|| RedisQueueError::Protocol("entry id is not a string".to_string()))?;

    let pairs: Vec<(Value, Value)> = match parts.next() {
        Some(Value::Array(fields)) => {
            let mut it = fields.into_iter();
            let mut pairs = Vec::new();
            while let (Some(k), Some(v)) = (it.next(), it.next()) {
                pairs.push((k, v));
            }
            pairs
        }
        Some(Value::Map(pairs)) => pairs,
        Some(Value::Nil) | None => Vec::new(),
        Some(other) => {
            return Err(RedisQueueError::Protocol(format!(
                "expected field list for entry {entry_id}, got {other:?}"
            )))
        }
    };

    // A missing or non-string `data` field is left for intake to reject.
    let data = pairs
        .iter()
        .find(|(k, _)| as_string(k).as_deref() == Some(DATA_FIELD))
        .and_then(|(_, v)| as_string(v));

    Ok(QueueEntry { entry_id, data })
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn entry(id: &str, fields: &[(&str, &str)]) -> Value {
        let fields = fields
            .iter()
            .flat_map(|(k, v)| [bulk(k), bulk(v)])
            .collect();
        Value::Array(vec![bulk(id), Value::Array(fields)])
    }

    fn reply(entries: Vec<Value>) -> Value {
        Value::Array(vec![Value::Array(vec![bulk("hooks"), Value::Array(entries)])])
    }

    #[test]
    fn test_nil_reply_is_empty() {
        assert!(parse_xread_reply(Value::Nil).unwrap().is_empty());
    }

    #[test]
    fn test_entries_in_order() {
        let value = reply(vec![
            entry("1700000000000-0", &[("data", r#"{"url":"http://a"}"#)]),
            entry("1700000000001-0", &[("other", "x"), ("data", "{}")]),
        ]);

        let entries = parse_xread_reply(value).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_id, "1700000000000-0");
        assert_eq!(entries[0].data.as_deref(), Some(r#"{"url":"http://a"}"#));
        assert_eq!(entries[1].entry_id, "1700000000001-0");
        assert_eq!(entries[1].data.as_deref(), Some("{}"));
    }

    #[test]
    fn test_missing_data_field_is_kept_as_none() {
        let entries = parse_xread_reply(reply(vec![entry("5-0", &[("payload", "{}")])])).unwrap();
        assert_eq!(entries[0].entry_id, "5-0");
        assert!(entries[0].data.is_none());
    }

    #[test]
    fn test_non_string_data_is_none() {
        let value = reply(vec![Value::Array(vec![
            bulk("6-0"),
            Value::Array(vec![bulk("data"), Value::Int(7)]),
        ])]);
        assert!(parse_xread_reply(value).unwrap()[0].data.is_none());
    }

    #[test]
    fn test_resp3_map_reply() {
        let value = Value::Map(vec![(
            bulk("hooks"),
            Value::Array(vec![Value::Array(vec![
                bulk("7-0"),
                Value::Map(vec![(bulk("data"), Value::SimpleString("{}".into()))]),
            ])]),
        )]);
        let entries = parse_xread_reply(value).unwrap();
        assert_eq!(entries[0].entry_id, "7-0");
        assert_eq!(entries[0].data.as_deref(), Some("{}"));
    }

    #[test]
    fn test_malformed_reply_is_protocol_error() {
        assert!(matches!(
            parse_xread_reply(Value::Int(1)),
            Err(RedisQueueError::Protocol(_))
        ));
        assert!(matches!(
            parse_xread_reply(reply(vec![Value::Int(3)])),
            Err(RedisQueueError::Protocol(_))
        ));
    }

    mod reconnect {
        use super::*;
        use crate::config::RedisQueueConfig;
        use sendhooks_core::{Queue, QueueError};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};

        /// Minimal RESP2 server: `+OK` to everything, a null array to XREAD.
        /// The first `drop_reads` XREADs close the connection instead.
        struct FakeRedis {
            address: String,
            connections: Arc<AtomicUsize>,
        }

        impl FakeRedis {
            async fn start(drop_reads: usize) -> Self {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let address = listener.local_addr().unwrap().to_string();
                let connections = Arc::new(AtomicUsize::new(0));
                let dropped = Arc::new(AtomicUsize::new(0));

                let accepted = connections.clone();
                tokio::spawn(async move {
                    while let Ok((stream, _)) = listener.accept().await {
                        accepted.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve(stream, dropped.clone(), drop_reads));
                    }
                });

                Self {
                    address,
                    connections,
                }
            }

            fn connections(&self) -> usize {
                self.connections.load(Ordering::SeqCst)
            }
        }

        async fn serve(mut stream: TcpStream, dropped: Arc<AtomicUsize>, drop_reads: usize) {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                while let Some((command, used)) = parse_command(&buf) {
                    buf.drain(..used);
                    let reply: &[u8] = if command.eq_ignore_ascii_case("XREAD") {
                        if dropped.fetch_add(1, Ordering::SeqCst) < drop_reads {
                            return;
                        }
                        b"*-1\r\n"
                    } else {
                        b"+OK\r\n"
                    };
                    if stream.write_all(reply).await.is_err() {
                        return;
                    }
                }
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
        }

        /// Parse one `*N\r\n$len\r\narg\r\n...` command, returning its name
        /// and the bytes consumed.
        fn parse_command(buf: &[u8]) -> Option<(String, usize)> {
            fn line(buf: &[u8], at: usize) -> Option<(&[u8], usize)> {
                let end = buf[at..].windows(2).position(|w| w == b"\r\n")? + at;
                Some((&buf[at..end], end + 2))
            }

            let (header, mut at) = line(buf, 0)?;
            let count: usize = std::str::from_utf8(header.strip_prefix(b"*")?).ok()?.parse().ok()?;
            let mut name = None;
            for _ in 0..count {
                let (len, next) = line(buf, at)?;
                let len: usize = std::str::from_utf8(len.strip_prefix(b"$")?).ok()?.parse().ok()?;
                if buf.len() < next + len + 2 {
                    return None;
                }
                if name.is_none() {
                    name = Some(String::from_utf8_lossy(&buf[next..next + len]).to_string());
                }
                at = next + len + 2;
            }
            Some((name?, at))
        }

        async fn queue(server: &FakeRedis) -> RedisStreamQueue {
            let config = RedisQueueConfig {
                address: server.address.clone(),
                ..RedisQueueConfig::new("hooks")
            };
            RedisStreamQueue::connect(config).await.unwrap()
        }

        #[test]
        fn test_parse_command_waits_for_whole_frame() {
            let frame = b"*2\r\n$4\r\nXDEL\r\n$3\r\n1-0\r\n";
            assert_eq!(parse_command(frame), Some(("XDEL".to_string(), frame.len())));
            assert_eq!(parse_command(&frame[..frame.len() - 3]), None);
        }

        #[tokio::test]
        async fn test_read_retries_once_on_new_connection() {
            let server = FakeRedis::start(1).await;
            let queue = queue(&server).await;

            let entries = queue.read_next(10).await.unwrap();

            assert!(entries.is_empty());
            assert_eq!(server.connections(), 2);
        }

        #[tokio::test]
        async fn test_read_gives_up_after_second_drop() {
            let server = FakeRedis::start(usize::MAX).await;
            let queue = queue(&server).await;

            let err = queue.read_next(10).await.unwrap_err();

            assert!(matches!(err, QueueError::Connection(_)), "{err:?}");
            assert_eq!(server.connections(), 2);
        }
    }
}

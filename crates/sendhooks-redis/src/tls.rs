//! Certificate loading for `rediss://` connections.

use crate::config::RedisTlsConfig;
use crate::error::{RedisQueueError, RedisQueueResult};
use redis::{ClientTlsConfig, TlsCertificates};
use std::path::Path;

/// Read the CA bundle and optional client pair from disk.
///
/// The CA certificate is mandatory. A client certificate without its key
/// (or the reverse) is rejected.
pub fn load_certificates(config: &RedisTlsConfig) -> RedisQueueResult<TlsCertificates> {
    if config.ca_cert.as_os_str().is_empty() {
        return Err(RedisQueueError::Tls(
            "a CA certificate is required when TLS is enabled".to_string(),
        ));
    }
    let root_cert = read_pem(&config.ca_cert, "CA certificate")?;

    let client_tls = match (&config.client_cert, &config.client_key) {
        (Some(cert), Some(key)) => Some(ClientTlsConfig {
            client_cert: read_pem(cert, "client certificate")?,
            client_key: read_pem(key, "client key")?,
        }),
        (None, None) => None,
        _ => {
            return Err(RedisQueueError::Tls(
                "client certificate and client key must be configured together".to_string(),
            ))
        }
    };

    Ok(TlsCertificates {
        client_tls,
        root_cert: Some(root_cert),
    })
}

fn read_pem(path: &Path, what: &str) -> RedisQueueResult<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|e| {
        RedisQueueError::Tls(format!("failed to read {what} {}: {e}", path.display()))
    })?;
    if bytes.is_empty() {
        return Err(RedisQueueError::Tls(format!(
            "{what} {} is empty",
            path.display()
        )));
    }
    Ok(bytes)
}

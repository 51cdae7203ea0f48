//! sendhooks binary entry point.
//!
//! Usage: sendhooks [--config <path>] [--log-level <level>] ...
//!
//! Reads webhook requests from the configured broker stream, delivers
//! them over HTTP and publishes each outcome on the status stream.
//! Exits non-zero when the intake loop fails.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppConfig, Broker, Overrides, DEFAULT_CONFIG_PATH};
use sendhooks_core::{
    DeliveryPipeline, EventLevel, EventSink, Queue, ReqwestTransport, TracingEventSink,
};
use sendhooks_redis::RedisStreamQueue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// sendhooks: reliable webhook delivery from a broker stream.
#[derive(Parser, Debug)]
#[command(name = "sendhooks")]
#[command(about = "Delivers webhooks queued on a broker stream and reports their status")]
struct Args {
    /// Path to the JSON config file. Defaults to ./config.json if present.
    #[arg(long, env = "SENDHOOKS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SENDHOOKS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Directory for daily log files.
    #[arg(long, env = "SENDHOOKS_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Redis address (host:port).
    #[arg(long, env = "REDIS_ADDRESS")]
    redis_address: Option<String>,

    /// Redis password.
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    redis_password: Option<String>,

    /// Stream carrying webhook requests.
    #[arg(long, env = "REDIS_STREAM_NAME")]
    stream: Option<String>,

    /// Stream receiving delivery outcomes.
    #[arg(long, env = "REDIS_STATUS_CHANNEL_NAME")]
    status_stream: Option<String>,

    /// Maximum concurrent delivery sequences.
    #[arg(long, env = "SENDHOOKS_MAX_IN_FLIGHT")]
    max_in_flight: Option<usize>,

    /// Acknowledge entries only after their outcome is reported.
    #[arg(long, env = "SENDHOOKS_ACK_AFTER_OUTCOME")]
    ack_after_outcome: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
            redis_address: self.redis_address.clone(),
            redis_password: self.redis_password.clone(),
            stream_name: self.stream.clone(),
            status_stream_name: self.status_stream.clone(),
            max_in_flight: self.max_in_flight,
            ack_after_outcome: self.ack_after_outcome,
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };
    config.apply_overrides(args.overrides());
    config.validate()?;
    Ok(config)
}

async fn connect_queue(config: &AppConfig) -> Result<Arc<dyn Queue>> {
    match config.broker()? {
        Broker::Redis => {
            let queue = RedisStreamQueue::connect(config.redis_config())
                .await
                .context("failed to connect to Redis")?;
            Ok(Arc::new(queue))
        }
    }
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Received shutdown signal, draining in-flight deliveries...");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    observability::init_with_config(config.log_config())
        .context("failed to initialize logging")?;

    let sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    sink.record(EventLevel::Event, "starting sendhooks engine");

    info!(
        broker = %config.broker,
        stream = %config.redis.redis_stream_name,
        status_stream = %config.redis.redis_stream_status_name,
        max_in_flight = config.delivery.max_in_flight,
        "Configuration loaded"
    );

    let queue = match connect_queue(&config).await {
        Ok(queue) => queue,
        Err(e) => {
            sink.record(EventLevel::Error, &format!("{e:#}"));
            return Err(e);
        }
    };

    let delivery = config.delivery_config();
    let transport = Arc::new(ReqwestTransport::new(delivery.request_timeout)?);
    let pipeline = DeliveryPipeline::new(delivery, queue, transport, sink.clone())?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    pipeline
        .run(cancel)
        .await
        .context("delivery pipeline stopped")?;

    info!("sendhooks stopped");
    Ok(())
}

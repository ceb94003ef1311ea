use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub event_stream: String,
    pub notification_stream: String,
    pub notification_stream_maxlen: usize,
    pub consumer_group: String,
    pub consumer_name: String,
    pub worker_count: usize,
    pub worker_batch_size: usize,
    pub stream_block: Duration,
    pub claim_idle: Duration,
    pub error_backoff: Duration,
    pub ack_on_publish_failure: bool,
    pub media_graph_url: String,
    pub media_bearer_token: Option<String>,
    pub webhook_url: Option<String>,
    pub allowed_origins: String,
    pub store_connect_timeout: Duration,
    pub live_buffer: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset and empty values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            server_port: parse(&get, "SERVER_PORT", 8080)?,
            database_url: get("DATABASE_URL").context("DATABASE_URL is required")?,
            redis_url: or("REDIS_URL", "redis://127.0.0.1:6379"),
            event_stream: or("EVENT_STREAM", "valpago:transactions"),
            notification_stream: or("NOTIFICATION_STREAM", "valpago:notifications"),
            notification_stream_maxlen: parse(&get, "NOTIFICATION_STREAM_MAXLEN", 10_000)?,
            consumer_group: or("CONSUMER_GROUP", "valpago:cg"),
            consumer_name: or("CONSUMER_NAME", "worker-1"),
            worker_count: parse(&get, "WORKER_COUNT", 1)?,
            worker_batch_size: parse(&get, "WORKER_BATCH_SIZE", 10)?,
            stream_block: Duration::from_millis(parse(&get, "STREAM_BLOCK_MS", 5_000)?),
            claim_idle: Duration::from_secs(parse(&get, "CLAIM_IDLE_SECS", 60)?),
            error_backoff: Duration::from_millis(parse(&get, "ERROR_BACKOFF_MS", 5_000)?),
            ack_on_publish_failure: parse(&get, "ACK_ON_PUBLISH_FAILURE", true)?,
            media_graph_url: or("MEDIA_GRAPH_URL", "https://graph.facebook.com/v18.0"),
            media_bearer_token: get("MEDIA_BEARER_TOKEN"),
            webhook_url: get("WEBHOOK_URL"),
            allowed_origins: or("ALLOWED_ORIGINS", "*"),
            store_connect_timeout: Duration::from_secs(parse(
                &get,
                "STORE_CONNECT_TIMEOUT_SECS",
                10,
            )?),
            live_buffer: parse(&get, "LIVE_BUFFER", 10)?,
        };

        if config.worker_count == 0 {
            anyhow::bail!("WORKER_COUNT must be at least 1");
        }
        if config.live_buffer == 0 {
            anyhow::bail!("LIVE_BUFFER must be at least 1");
        }

        Ok(config)
    }

    /// Parsed `ALLOWED_ORIGINS`; `None` means any origin.
    pub fn origins(&self) -> Option<Vec<String>> {
        let value = self.allowed_origins.trim();
        if value == "*" {
            return None;
        }
        Some(
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

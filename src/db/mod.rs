use redis::aio::ConnectionManager;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::Config;
use crate::ports::StoreError;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(config.store_connect_timeout)
        .connect(&config.database_url)
        .await
}

/// Open a self-reconnecting Redis connection, giving up after `timeout`.
/// A command that fails on a dropped socket returns the error and the next
/// command runs on a fresh connection.
pub async fn connect_redis(
    client: &redis::Client,
    timeout: Duration,
) -> Result<ConnectionManager, StoreError> {
    tokio::time::timeout(timeout, ConnectionManager::new(client.clone()))
        .await
        .map_err(|_| StoreError::Timeout(format!("redis connection after {:?}", timeout)))?
        .map_err(StoreError::from)
}

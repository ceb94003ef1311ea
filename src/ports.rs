//! Seams to the external services the pipeline runs against.
//!
//! Every component receives these as `Arc<dyn ...>` handles at construction.
//! Production wiring uses Redis (status register, event log, broadcast log)
//! and Postgres (record store); tests use the in-memory adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{LogRecord, Merchant, Transaction, TransactionStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a compare-and-swap on the status register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    Swapped,
    NotFound,
    /// The register held a different value, reported verbatim.
    Conflict(String),
}

#[async_trait]
pub trait StatusRegister: Send + Sync {
    /// Set `pending` if no entry exists. Returns whether the entry was created.
    async fn init_pending(&self, id: Uuid) -> StoreResult<bool>;

    /// Atomically move `expected -> next`; nothing is written unless the
    /// register currently holds `expected`.
    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> StoreResult<CasOutcome>;

    async fn current(&self, id: Uuid) -> StoreResult<Option<String>>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn user_exists(&self, user_id: &str) -> StoreResult<bool>;

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<Transaction>;

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Fails with `StoreError::NotFound` when no record matches.
    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction>;

    /// Overwrites the evidence reference. Fails with `StoreError::NotFound`
    /// when no record matches.
    async fn set_evidence_url(&self, id: Uuid, url: &str, at: DateTime<Utc>) -> StoreResult<()>;

    async fn list_by_status(&self, status: TransactionStatus) -> StoreResult<Vec<Transaction>>;

    async fn find_merchant_by_account(&self, account: &str) -> StoreResult<Option<Merchant>>;
}

/// One entry handed to a consumer-group member, identified by its log id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub record: LogRecord,
}

/// Durable log consumed through a single named consumer group.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, record: &LogRecord) -> StoreResult<String>;

    /// Create the consumer group (and the log) if missing. Existing groups
    /// are not an error.
    async fn ensure_group(&self) -> StoreResult<()>;

    /// Open a member of the group. Members own their connection since reads
    /// block.
    async fn consumer(&self, name: &str) -> StoreResult<Box<dyn EventConsumer>>;
}

#[async_trait]
pub trait EventConsumer: Send {
    fn name(&self) -> &str;

    /// Entries never delivered to the group. An elapsed `block` with nothing
    /// to read yields an empty batch, not an error.
    async fn read_new(&mut self, count: usize, block: Duration) -> StoreResult<Vec<Delivery>>;

    /// Entries delivered to this member earlier and never acknowledged.
    async fn read_own_pending(&mut self, count: usize) -> StoreResult<Vec<Delivery>>;

    /// Take over entries other members left unacknowledged for at least
    /// `min_idle`.
    async fn claim_stale(&mut self, min_idle: Duration, count: usize) -> StoreResult<Vec<Delivery>>;

    async fn ack(&mut self, id: &str) -> StoreResult<()>;
}

/// Fan-out log: no groups, every reader keeps its own cursor.
#[async_trait]
pub trait BroadcastLog: Send + Sync {
    async fn append(&self, record: &LogRecord) -> StoreResult<String>;

    /// Start a reader positioned after the newest entry at call time.
    async fn tail(&self) -> StoreResult<Box<dyn BroadcastTail>>;
}

#[async_trait]
pub trait BroadcastTail: Send {
    async fn next_batch(&mut self, block: Duration) -> StoreResult<Vec<LogRecord>>;
}

/// Outbound notification of a final decision to the merchant.
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    /// Best effort: failures are logged by the implementation, never returned.
    async fn notify_decision(&self, phone: &str, approved: bool);
}

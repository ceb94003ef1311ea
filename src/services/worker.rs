//! Event log consumer pool.
//!
//! Each worker task owns one consumer-group member. It re-reads its own
//! pending entries on start, periodically claims entries abandoned by dead
//! peers, and otherwise blocks on new entries until shutdown. Every handled
//! entry produces one broadcast notification before it is acknowledged.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{EventType, LogRecord, Notification};
use crate::ports::{BroadcastLog, Delivery, EventConsumer, EventLog, RecordStore, StoreResult};
use crate::services::evidence::EvidenceResolver;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: usize,
    pub block: Duration,
    pub claim_idle: Duration,
    pub error_backoff: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.worker_batch_size.max(1),
            block: config.stream_block,
            claim_idle: config.claim_idle,
            error_backoff: config.error_backoff,
        }
    }
}

/// Fields the worker needs from a `transaction.created` payload.
#[derive(Debug, Default, Deserialize)]
struct CreatedPayload {
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    evidence_token: Option<String>,
}

pub struct EnrichmentWorker {
    records: Arc<dyn RecordStore>,
    broadcast: Arc<dyn BroadcastLog>,
    evidence: Arc<EvidenceResolver>,
    ack_on_publish_failure: bool,
}

impl EnrichmentWorker {
    pub fn new(
        records: Arc<dyn RecordStore>,
        broadcast: Arc<dyn BroadcastLog>,
        evidence: Arc<EvidenceResolver>,
        ack_on_publish_failure: bool,
    ) -> Self {
        Self {
            records,
            broadcast,
            evidence,
            ack_on_publish_failure,
        }
    }

    /// Build the broadcast notification for one log entry, enriching
    /// `transaction.created` entries first.
    pub async fn process(&self, record: &LogRecord) -> Notification {
        let kind = record.event_type();

        let Some(raw) = record.data.as_deref() else {
            let status = kind.map(|k| k.status().as_str()).unwrap_or("unknown");
            let notification_type = kind
                .map(|k| k.notification_type().to_string())
                .or_else(|| record.kind.clone());
            return Notification::status_only(notification_type.as_deref(), status);
        };

        let payload =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        match kind {
            Some(EventType::Created) => {
                let payload = self.enrich(payload).await;
                Notification::with_payload(EventType::Created.notification_type(), payload)
            }
            _ => Notification {
                kind: record.kind.clone(),
                data: Some(payload),
                status: None,
                timestamp: Utc::now().timestamp(),
            },
        }
    }

    async fn enrich(&self, payload: Value) -> Value {
        let created: CreatedPayload = serde_json::from_value(payload.clone()).unwrap_or_default();

        let Some(id) = created.id else {
            warn!("Created event without transaction id, publishing as received");
            return payload;
        };
        let Some(token) = created.evidence_token.filter(|t| !t.trim().is_empty()) else {
            info!(transaction_id = %id, "No evidence token, publishing as received");
            return payload;
        };

        let evidence = self.evidence.resolve(&token).await;
        if let Err(e) = self
            .records
            .set_evidence_url(id, &evidence.data_uri, Utc::now())
            .await
        {
            warn!(
                transaction_id = %id,
                error = %e,
                "Failed to store evidence, publishing as received"
            );
            return payload;
        }
        info!(
            transaction_id = %id,
            source = ?evidence.source,
            mime = %evidence.mime,
            "Evidence attached"
        );

        match self.records.get_transaction(id).await {
            Ok(Some(tx)) => match serde_json::to_value(&tx) {
                Ok(value) => value,
                Err(e) => {
                    warn!(transaction_id = %id, error = %e, "Failed to encode enriched record");
                    with_evidence(payload, &evidence.data_uri)
                }
            },
            Ok(None) => {
                warn!(transaction_id = %id, "Enriched record disappeared before re-read");
                with_evidence(payload, &evidence.data_uri)
            }
            Err(e) => {
                warn!(transaction_id = %id, error = %e, "Failed to re-read enriched record");
                with_evidence(payload, &evidence.data_uri)
            }
        }
    }

    /// Publish the notification for `delivery` and acknowledge it. Returns
    /// whether the entry was acknowledged.
    pub async fn handle(
        &self,
        consumer: &mut dyn EventConsumer,
        delivery: &Delivery,
    ) -> StoreResult<bool> {
        let notification = self.process(&delivery.record).await;

        match self.broadcast.append(&notification.to_record()).await {
            Ok(notification_id) => {
                debug!(
                    consumer = %consumer.name(),
                    entry_id = %delivery.id,
                    notification_id = %notification_id,
                    "Notification published"
                );
            }
            Err(e) if self.ack_on_publish_failure => {
                error!(
                    consumer = %consumer.name(),
                    entry_id = %delivery.id,
                    error = %e,
                    "Notification publish failed; acknowledging anyway"
                );
            }
            Err(e) => {
                error!(
                    consumer = %consumer.name(),
                    entry_id = %delivery.id,
                    error = %e,
                    "Notification publish failed; leaving entry pending"
                );
                return Ok(false);
            }
        }

        consumer.ack(&delivery.id).await?;
        Ok(true)
    }

    async fn handle_batch(&self, consumer: &mut dyn EventConsumer, batch: &[Delivery]) -> usize {
        let mut acked = 0;
        for delivery in batch {
            match self.handle(consumer, delivery).await {
                Ok(true) => acked += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        consumer = %consumer.name(),
                        entry_id = %delivery.id,
                        error = %e,
                        "Acknowledge failed; entry stays pending"
                    );
                }
            }
        }
        acked
    }
}

fn with_evidence(payload: Value, data_uri: &str) -> Value {
    match payload {
        Value::Object(mut map) => {
            map.insert("evidence_url".to_string(), Value::String(data_uri.to_string()));
            Value::Object(map)
        }
        other => other,
    }
}

fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `duration`, returning early (with `true`) on shutdown.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => is_shutdown(shutdown),
        _ = shutdown.changed() => true,
    }
}

/// Open the named group member, retrying until it succeeds. `None` on
/// shutdown.
async fn open_consumer(
    events: &dyn EventLog,
    name: &str,
    backoff: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Box<dyn EventConsumer>> {
    loop {
        if is_shutdown(shutdown) {
            return None;
        }
        match events.consumer(name).await {
            Ok(consumer) => return Some(consumer),
            Err(e) => {
                error!(consumer = %name, error = %e, "Failed to open consumer");
                if pause(backoff, shutdown).await {
                    return None;
                }
            }
        }
    }
}

/// Run one consumer-group member until the shutdown signal fires.
pub async fn run_consumer(
    worker: Arc<EnrichmentWorker>,
    events: Arc<dyn EventLog>,
    name: String,
    settings: WorkerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let Some(mut consumer) =
        open_consumer(events.as_ref(), &name, settings.error_backoff, &mut shutdown).await
    else {
        return;
    };
    info!(consumer = %name, "Worker started");

    // Entries this member read before a restart but never acknowledged.
    loop {
        match consumer.read_own_pending(settings.batch_size).await {
            Ok(batch) if batch.is_empty() => break,
            Ok(batch) => {
                info!(consumer = %name, count = batch.len(), "Reprocessing own pending entries");
                if worker.handle_batch(consumer.as_mut(), &batch).await == 0 {
                    break;
                }
            }
            Err(e) => {
                warn!(consumer = %name, error = %e, "Failed to read own pending entries");
                break;
            }
        }
    }

    let mut next_claim = Instant::now();
    loop {
        if is_shutdown(&shutdown) {
            break;
        }

        if Instant::now() >= next_claim {
            next_claim = Instant::now() + settings.claim_idle;
            match consumer
                .claim_stale(settings.claim_idle, settings.batch_size)
                .await
            {
                Ok(batch) if !batch.is_empty() => {
                    info!(consumer = %name, count = batch.len(), "Claimed stale entries");
                    worker.handle_batch(consumer.as_mut(), &batch).await;
                }
                Ok(_) => {}
                Err(e) => warn!(consumer = %name, error = %e, "Failed to claim stale entries"),
            }
        }

        let read = tokio::select! {
            _ = shutdown.changed() => break,
            read = consumer.read_new(settings.batch_size, settings.block) => read,
        };

        match read {
            Ok(batch) if batch.is_empty() => continue,
            Ok(batch) => {
                debug!(consumer = %name, count = batch.len(), "Read batch");
                worker.handle_batch(consumer.as_mut(), &batch).await;
            }
            Err(e) => {
                error!(consumer = %name, error = %e, "Read failed, reopening consumer");
                if pause(settings.error_backoff, &mut shutdown).await {
                    break;
                }
                match open_consumer(events.as_ref(), &name, settings.error_backoff, &mut shutdown)
                    .await
                {
                    Some(reopened) => consumer = reopened,
                    None => break,
                }
            }
        }
    }

    info!(consumer = %name, "Worker stopped");
}

/// Create the consumer group and start `count` members named after
/// `base_name`.
pub async fn spawn_workers(
    worker: Arc<EnrichmentWorker>,
    events: Arc<dyn EventLog>,
    base_name: &str,
    count: usize,
    settings: WorkerSettings,
    shutdown: watch::Receiver<bool>,
) -> StoreResult<Vec<JoinHandle<()>>> {
    events.ensure_group().await?;

    let handles = (0..count.max(1))
        .map(|i| {
            let name = if count <= 1 {
                base_name.to_string()
            } else {
                format!("{}-{}", base_name, i + 1)
            };
            tokio::spawn(run_consumer(
                worker.clone(),
                events.clone(),
                name,
                settings.clone(),
                shutdown.clone(),
            ))
        })
        .collect();

    Ok(handles)
}

//! Redis stream implementations of EventLog and BroadcastLog.
//!
//! The event log is a stream read through one consumer group (XREADGROUP /
//! XACK / XCLAIM). The broadcast log is a capped stream read with plain XREAD,
//! each tail keeping its own last-seen id.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamMaxlen, StreamPendingCountReply, StreamRangeReply,
    StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use std::time::Duration;

use crate::db::connect_redis;
use crate::domain::LogRecord;
use crate::ports::{
    BroadcastLog, BroadcastTail, Delivery, EventConsumer, EventLog, StoreResult,
};

const BUSYGROUP: &str = "BUSYGROUP";
const TAIL_BATCH: usize = 100;
const CLAIM_SCAN_PAGE: usize = 100;

fn to_record(entry: &StreamId) -> LogRecord {
    LogRecord::from_fields(entry.map.iter().filter_map(|(key, value)| {
        redis::from_redis_value::<String>(value)
            .ok()
            .map(|text| (key.as_str(), text))
    }))
}

fn to_deliveries(reply: Option<StreamReadReply>) -> Vec<Delivery> {
    reply
        .map(|reply| {
            reply
                .keys
                .into_iter()
                .flat_map(|key| key.ids)
                .map(|entry| Delivery {
                    record: to_record(&entry),
                    id: entry.id,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Smallest entry id strictly after `id`, for inclusive XPENDING ranges.
fn next_stream_id(id: &str) -> Option<String> {
    let (ms, seq) = id.split_once('-')?;
    let ms: u64 = ms.parse().ok()?;
    let seq: u64 = seq.parse().ok()?;
    match seq.checked_add(1) {
        Some(seq) => Some(format!("{}-{}", ms, seq)),
        None => ms.checked_add(1).map(|ms| format!("{}-0", ms)),
    }
}

fn block_millis(block: Duration) -> usize {
    block.as_millis().max(1) as usize
}

// --- Event log ---

#[derive(Clone)]
pub struct RedisEventLog {
    client: redis::Client,
    conn: ConnectionManager,
    stream: String,
    group: String,
    connect_timeout: Duration,
}

impl RedisEventLog {
    pub fn new(
        client: redis::Client,
        conn: ConnectionManager,
        stream: impl Into<String>,
        group: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            client,
            conn,
            stream: stream.into(),
            group: group.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn append(&self, record: &LogRecord) -> StoreResult<String> {
        let mut conn = self.conn.clone();
        let fields = record.fields();
        let id: String = conn.xadd(&self.stream, "*", fields.as_slice()).await?;
        Ok(id)
    }

    async fn ensure_group(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;
        match created {
            Ok(()) => {
                tracing::info!(stream = %self.stream, group = %self.group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some(BUSYGROUP) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn consumer(&self, name: &str) -> StoreResult<Box<dyn EventConsumer>> {
        let conn = connect_redis(&self.client, self.connect_timeout).await?;
        Ok(Box::new(RedisEventConsumer {
            conn,
            stream: self.stream.clone(),
            group: self.group.clone(),
            name: name.to_string(),
        }))
    }
}

pub struct RedisEventConsumer {
    conn: ConnectionManager,
    stream: String,
    group: String,
    name: String,
}

impl RedisEventConsumer {
    async fn read_group(
        &mut self,
        start: &str,
        count: usize,
        block: Option<Duration>,
    ) -> StoreResult<Vec<Delivery>> {
        let mut opts = StreamReadOptions::default()
            .group(&self.group, &self.name)
            .count(count);
        if let Some(block) = block {
            opts = opts.block(block_millis(block));
        }
        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[self.stream.as_str()], &[start], &opts)
            .await?;
        Ok(to_deliveries(reply))
    }
}

#[async_trait]
impl EventConsumer for RedisEventConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_new(&mut self, count: usize, block: Duration) -> StoreResult<Vec<Delivery>> {
        self.read_group(">", count, Some(block)).await
    }

    async fn read_own_pending(&mut self, count: usize) -> StoreResult<Vec<Delivery>> {
        self.read_group("0", count, None).await
    }

    async fn claim_stale(
        &mut self,
        min_idle: Duration,
        count: usize,
    ) -> StoreResult<Vec<Delivery>> {
        let min_idle_ms = min_idle.as_millis() as usize;
        let page = count.max(CLAIM_SCAN_PAGE);
        let mut start = "-".to_string();
        let mut stale: Vec<String> = Vec::new();

        // Walk the whole pending list; own and fresh entries must not hide
        // stale ones further along.
        while stale.len() < count {
            let pending: StreamPendingCountReply = self
                .conn
                .xpending_count(&self.stream, &self.group, &start, "+", page)
                .await?;
            let fetched = pending.ids.len();
            let last = pending.ids.last().map(|entry| entry.id.clone());

            stale.extend(
                pending
                    .ids
                    .into_iter()
                    .filter(|entry| {
                        entry.consumer != self.name && entry.last_delivered_ms >= min_idle_ms
                    })
                    .map(|entry| entry.id),
            );

            match last.as_deref().and_then(next_stream_id) {
                Some(next) if fetched == page => start = next,
                _ => break,
            }
        }
        stale.truncate(count);
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = self
            .conn
            .xclaim(&self.stream, &self.group, &self.name, min_idle_ms, stale.as_slice())
            .await?;
        Ok(claimed
            .ids
            .into_iter()
            .map(|entry| Delivery {
                record: to_record(&entry),
                id: entry.id,
            })
            .collect())
    }

    async fn ack(&mut self, id: &str) -> StoreResult<()> {
        let _: usize = self.conn.xack(&self.stream, &self.group, &[id]).await?;
        Ok(())
    }
}

// --- Broadcast log ---

#[derive(Clone)]
pub struct RedisBroadcastLog {
    client: redis::Client,
    conn: ConnectionManager,
    stream: String,
    maxlen: usize,
    connect_timeout: Duration,
}

impl RedisBroadcastLog {
    pub fn new(
        client: redis::Client,
        conn: ConnectionManager,
        stream: impl Into<String>,
        maxlen: usize,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            client,
            conn,
            stream: stream.into(),
            maxlen,
            connect_timeout,
        }
    }
}

#[async_trait]
impl BroadcastLog for RedisBroadcastLog {
    async fn append(&self, record: &LogRecord) -> StoreResult<String> {
        let mut conn = self.conn.clone();
        let fields = record.fields();
        let id: String = conn
            .xadd_maxlen(
                &self.stream,
                StreamMaxlen::Approx(self.maxlen),
                "*",
                fields.as_slice(),
            )
            .await?;
        Ok(id)
    }

    async fn tail(&self) -> StoreResult<Box<dyn BroadcastTail>> {
        let mut conn = connect_redis(&self.client, self.connect_timeout).await?;
        let newest: StreamRangeReply = conn.xrevrange_count(&self.stream, "+", "-", 1).await?;
        let cursor = newest
            .ids
            .first()
            .map(|entry| entry.id.clone())
            .unwrap_or_else(|| "0-0".to_string());

        Ok(Box::new(RedisBroadcastTail {
            conn,
            stream: self.stream.clone(),
            cursor,
        }))
    }
}

pub struct RedisBroadcastTail {
    conn: ConnectionManager,
    stream: String,
    cursor: String,
}

#[async_trait]
impl BroadcastTail for RedisBroadcastTail {
    async fn next_batch(&mut self, block: Duration) -> StoreResult<Vec<LogRecord>> {
        let opts = StreamReadOptions::default()
            .count(TAIL_BATCH)
            .block(block_millis(block));
        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[self.stream.as_str()], &[self.cursor.as_str()], &opts)
            .await?;

        let deliveries = to_deliveries(reply);
        if let Some(last) = deliveries.last() {
            self.cursor = last.id.clone();
        }
        Ok(deliveries.into_iter().map(|delivery| delivery.record).collect())
    }
}

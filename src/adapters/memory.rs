//! In-process implementations of the store seams.
//!
//! They follow the same contracts as the Redis and Postgres adapters
//! (consumer-group pending lists, tail-from-now cursors, CAS semantics) and
//! back the test suite and local runs without infrastructure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{LogRecord, Merchant, Transaction, TransactionStatus};
use crate::ports::{
    BroadcastLog, BroadcastTail, CasOutcome, Delivery, EventConsumer, EventLog, RecordStore,
    StatusRegister, StoreError, StoreResult,
};

// --- Status register ---

#[derive(Default)]
pub struct MemoryStatusRegister {
    entries: Mutex<HashMap<Uuid, String>>,
}

impl MemoryStatusRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw value, bypassing CAS. Test setup only.
    pub async fn force(&self, id: Uuid, value: &str) {
        self.entries.lock().await.insert(id, value.to_string());
    }
}

#[async_trait]
impl StatusRegister for MemoryStatusRegister {
    async fn init_pending(&self, id: Uuid) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&id) {
            return Ok(false);
        }
        entries.insert(id, TransactionStatus::Pending.as_str().to_string());
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> StoreResult<CasOutcome> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&id) {
            None => Ok(CasOutcome::NotFound),
            Some(current) if current.as_str() != expected.as_str() => {
                Ok(CasOutcome::Conflict(current.clone()))
            }
            Some(current) => {
                *current = next.as_str().to_string();
                Ok(CasOutcome::Swapped)
            }
        }
    }

    async fn current(&self, id: Uuid) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().await.get(&id).cloned())
    }
}

// --- Record store ---

#[derive(Default)]
pub struct MemoryRecordStore {
    users: RwLock<HashSet<String>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    merchants: RwLock<Vec<Merchant>>,
    fail_writes: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user_id: &str) {
        self.users.write().await.insert(user_id.to_string());
    }

    pub async fn insert_merchant(&self, merchant: Merchant) {
        self.merchants.write().await.push(merchant);
    }

    /// Make every subsequent update fail, simulating an unavailable store.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("record store rejected write".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn user_exists(&self, user_id: &str) -> StoreResult<bool> {
        Ok(self.users.read().await.contains(user_id))
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<Transaction> {
        self.check_writable()?;
        self.transactions.write().await.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction> {
        self.check_writable()?;
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?;
        tx.status = status;
        tx.updated_at = at;
        Ok(tx.clone())
    }

    async fn set_evidence_url(&self, id: Uuid, url: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.check_writable()?;
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?;
        tx.evidence_url = Some(url.to_string());
        tx.updated_at = at;
        Ok(())
    }

    async fn list_by_status(&self, status: TransactionStatus) -> StoreResult<Vec<Transaction>> {
        let mut matching: Vec<Transaction> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|tx| tx.created_at);
        Ok(matching)
    }

    async fn find_merchant_by_account(&self, account: &str) -> StoreResult<Option<Merchant>> {
        Ok(self
            .merchants
            .read()
            .await
            .iter()
            .find(|merchant| merchant.owns_account(account))
            .cloned())
    }
}

// --- Event log ---

struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    deliveries: u32,
}

#[derive(Default)]
struct GroupState {
    entries: Vec<(String, LogRecord)>,
    /// Number of entries already handed to the group.
    delivered: usize,
    pending: BTreeMap<u64, PendingEntry>,
}

impl GroupState {
    fn record(&self, seq: u64) -> Delivery {
        let (id, record) = &self.entries[seq as usize];
        Delivery {
            id: id.clone(),
            record: record.clone(),
        }
    }
}

fn entry_id(seq: u64) -> String {
    format!("{}-0", seq + 1)
}

fn entry_seq(id: &str) -> Option<u64> {
    id.split('-')
        .next()
        .and_then(|ms| ms.parse::<u64>().ok())
        .and_then(|n| n.checked_sub(1))
}

#[derive(Clone)]
pub struct MemoryEventLog {
    state: Arc<Mutex<GroupState>>,
    appended: Arc<watch::Sender<u64>>,
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventLog {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(GroupState::default())),
            appended: Arc::new(appended),
        }
    }

    pub async fn entries(&self) -> Vec<LogRecord> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// How many times the entry has been handed out, if still pending.
    pub async fn delivery_count(&self, id: &str) -> Option<u32> {
        let seq = entry_seq(id)?;
        self.state
            .lock()
            .await
            .pending
            .get(&seq)
            .map(|entry| entry.deliveries)
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, record: &LogRecord) -> StoreResult<String> {
        let id = {
            let mut state = self.state.lock().await;
            let id = entry_id(state.entries.len() as u64);
            state.entries.push((id.clone(), record.clone()));
            id
        };
        self.appended.send_modify(|count| *count += 1);
        Ok(id)
    }

    async fn ensure_group(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn consumer(&self, name: &str) -> StoreResult<Box<dyn EventConsumer>> {
        Ok(Box::new(MemoryEventConsumer {
            name: name.to_string(),
            state: self.state.clone(),
            appended: self.appended.subscribe(),
        }))
    }
}

pub struct MemoryEventConsumer {
    name: String,
    state: Arc<Mutex<GroupState>>,
    appended: watch::Receiver<u64>,
}

impl MemoryEventConsumer {
    async fn take_new(&self, count: usize) -> Vec<Delivery> {
        let mut state = self.state.lock().await;
        let start = state.delivered;
        let end = (start + count).min(state.entries.len());
        let now = Instant::now();
        let mut batch = Vec::with_capacity(end - start);
        for seq in start as u64..end as u64 {
            state.pending.insert(
                seq,
                PendingEntry {
                    consumer: self.name.clone(),
                    delivered_at: now,
                    deliveries: 1,
                },
            );
            batch.push(state.record(seq));
        }
        state.delivered = end;
        batch
    }
}

#[async_trait]
impl EventConsumer for MemoryEventConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_new(&mut self, count: usize, block: Duration) -> StoreResult<Vec<Delivery>> {
        let deadline = Instant::now() + block;
        loop {
            self.appended.borrow_and_update();
            let batch = self.take_new(count).await;
            if !batch.is_empty() {
                return Ok(batch);
            }
            match tokio::time::timeout_at(deadline, self.appended.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Ok(Vec::new()),
            }
        }
    }

    async fn read_own_pending(&mut self, count: usize) -> StoreResult<Vec<Delivery>> {
        let state = self.state.lock().await;
        Ok(state
            .pending
            .iter()
            .filter(|(_, entry)| entry.consumer == self.name)
            .take(count)
            .map(|(seq, _)| state.record(*seq))
            .collect())
    }

    async fn claim_stale(
        &mut self,
        min_idle: Duration,
        count: usize,
    ) -> StoreResult<Vec<Delivery>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let stale: Vec<u64> = state
            .pending
            .iter()
            .filter(|(_, entry)| {
                entry.consumer != self.name && now.duration_since(entry.delivered_at) >= min_idle
            })
            .take(count)
            .map(|(seq, _)| *seq)
            .collect();

        let mut claimed = Vec::with_capacity(stale.len());
        for seq in stale {
            if let Some(entry) = state.pending.get_mut(&seq) {
                entry.consumer = self.name.clone();
                entry.delivered_at = now;
                entry.deliveries += 1;
            }
            claimed.push(state.record(seq));
        }
        Ok(claimed)
    }

    async fn ack(&mut self, id: &str) -> StoreResult<()> {
        if let Some(seq) = entry_seq(id) {
            self.state.lock().await.pending.remove(&seq);
        }
        Ok(())
    }
}

// --- Broadcast log ---

#[derive(Clone)]
pub struct MemoryBroadcastLog {
    entries: Arc<Mutex<Vec<LogRecord>>>,
    appended: Arc<watch::Sender<u64>>,
    fail_appends: Arc<AtomicBool>,
}

impl Default for MemoryBroadcastLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroadcastLog {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            appended: Arc::new(appended),
            fail_appends: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn entries(&self) -> Vec<LogRecord> {
        self.entries.lock().await.clone()
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BroadcastLog for MemoryBroadcastLog {
    async fn append(&self, record: &LogRecord) -> StoreResult<String> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("broadcast log rejected append".to_string()));
        }
        let id = {
            let mut entries = self.entries.lock().await;
            entries.push(record.clone());
            entry_id(entries.len() as u64 - 1)
        };
        self.appended.send_modify(|count| *count += 1);
        Ok(id)
    }

    async fn tail(&self) -> StoreResult<Box<dyn BroadcastTail>> {
        let cursor = self.entries.lock().await.len();
        Ok(Box::new(MemoryBroadcastTail {
            entries: self.entries.clone(),
            appended: self.appended.subscribe(),
            cursor,
        }))
    }
}

pub struct MemoryBroadcastTail {
    entries: Arc<Mutex<Vec<LogRecord>>>,
    appended: watch::Receiver<u64>,
    cursor: usize,
}

#[async_trait]
impl BroadcastTail for MemoryBroadcastTail {
    async fn next_batch(&mut self, block: Duration) -> StoreResult<Vec<LogRecord>> {
        let deadline = Instant::now() + block;
        loop {
            self.appended.borrow_and_update();
            {
                let entries = self.entries.lock().await;
                if entries.len() > self.cursor {
                    let batch = entries[self.cursor..].to_vec();
                    self.cursor = entries.len();
                    return Ok(batch);
                }
            }
            match tokio::time::timeout_at(deadline, self.appended.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Ok(Vec::new()),
            }
        }
    }
}

//! Transaction lifecycle use cases.
//! Every write follows the same order: status register, record store, event log.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    EventType, LifecycleEvent, NewTransaction, Transaction, TransactionStatus, Transition,
};
use crate::ports::{CasOutcome, EventLog, RecordStore, StatusRegister, StoreError, WebhookNotifier};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    #[error("Transaction is {current}")]
    Conflict { current: String },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Record store error: {0}")]
    RecordStore(String),
}

impl ServiceError {
    fn unavailable(what: &str, err: StoreError) -> Self {
        ServiceError::Unavailable(format!("{}: {}", what, err))
    }

    fn record_store(err: StoreError) -> Self {
        ServiceError::RecordStore(err.to_string())
    }
}

pub struct TransactionService {
    register: Arc<dyn StatusRegister>,
    records: Arc<dyn RecordStore>,
    events: Arc<dyn EventLog>,
    webhook: Arc<dyn WebhookNotifier>,
}

impl TransactionService {
    pub fn new(
        register: Arc<dyn StatusRegister>,
        records: Arc<dyn RecordStore>,
        events: Arc<dyn EventLog>,
        webhook: Arc<dyn WebhookNotifier>,
    ) -> Self {
        Self {
            register,
            records,
            events,
            webhook,
        }
    }

    pub async fn create(
        &self,
        user_id: &str,
        input: NewTransaction,
    ) -> Result<Transaction, ServiceError> {
        let known = self
            .records
            .user_exists(user_id)
            .await
            .map_err(ServiceError::record_store)?;
        if !known {
            return Err(ServiceError::UnknownUser(user_id.to_string()));
        }

        let tx = Transaction::new(user_id.to_string(), input);

        let created = self
            .register
            .init_pending(tx.id)
            .await
            .map_err(|e| ServiceError::unavailable("status register", e))?;
        if !created {
            let existing = self.register.current(tx.id).await.ok().flatten();
            warn!(
                transaction_id = %tx.id,
                existing = existing.as_deref().unwrap_or("unknown"),
                "Status register entry already existed"
            );
        }

        let tx = self.records.insert_transaction(&tx).await.map_err(|e| {
            warn!(
                transaction_id = %tx.id,
                register = "pending",
                error = %e,
                "Record store insert failed after register init"
            );
            ServiceError::record_store(e)
        })?;

        self.publish(EventType::Created, &tx).await?;

        info!(transaction_id = %tx.id, amount = %tx.amount, "Transaction created");
        Ok(tx)
    }

    /// Apply an operator action. The register CAS decides the outcome; the
    /// record store and event log follow only after it succeeds.
    pub async fn transition(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<Transaction, ServiceError> {
        let outcome = self
            .register
            .compare_and_swap(id, transition.required(), transition.target())
            .await
            .map_err(|e| ServiceError::unavailable("status register", e))?;

        match outcome {
            CasOutcome::Swapped => {}
            CasOutcome::NotFound => return Err(ServiceError::NotFound(id)),
            CasOutcome::Conflict(current) => {
                info!(transaction_id = %id, %transition, current = %current, "Transition rejected");
                return Err(ServiceError::Conflict { current });
            }
        }

        // No compensation: the register keeps the new state if this write fails.
        let tx = self
            .records
            .update_status(id, transition.target(), Utc::now())
            .await
            .map_err(|e| {
                warn!(
                    transaction_id = %id,
                    register = %transition.target(),
                    record_store = %transition.required(),
                    error = %e,
                    "Record store update failed after register swap; states diverge"
                );
                ServiceError::record_store(e)
            })?;

        self.publish(transition.event_type(), &tx).await?;
        info!(transaction_id = %id, status = %tx.status, "Transaction transitioned");

        if transition.is_decision() {
            self.notify_merchant(&tx, transition == Transition::Approve).await;
        }

        Ok(tx)
    }

    pub async fn get(&self, id: Uuid) -> Result<Transaction, ServiceError> {
        self.records
            .get_transaction(id)
            .await
            .map_err(ServiceError::record_store)?
            .ok_or(ServiceError::NotFound(id))
    }

    pub async fn list(&self, status: TransactionStatus) -> Result<Vec<Transaction>, ServiceError> {
        self.records
            .list_by_status(status)
            .await
            .map_err(ServiceError::record_store)
    }

    async fn publish(&self, kind: EventType, tx: &Transaction) -> Result<(), ServiceError> {
        let record = LifecycleEvent::new(kind, tx.clone())
            .to_record()
            .map_err(|e| ServiceError::RecordStore(e.to_string()))?;

        let entry_id = self.events.append(&record).await.map_err(|e| {
            warn!(transaction_id = %tx.id, event = %kind, error = %e, "Event append failed");
            ServiceError::unavailable("event log", e)
        })?;

        info!(transaction_id = %tx.id, entry_id = %entry_id, event = %kind, "Event appended");
        Ok(())
    }

    async fn notify_merchant(&self, tx: &Transaction, approved: bool) {
        match self
            .records
            .find_merchant_by_account(&tx.destination_account)
            .await
        {
            Ok(Some(merchant)) if !merchant.phone.trim().is_empty() => {
                self.webhook.notify_decision(&merchant.phone, approved).await;
            }
            Ok(_) => {
                info!(
                    transaction_id = %tx.id,
                    account = %tx.destination_account,
                    "No merchant to notify for account"
                );
            }
            Err(e) => {
                warn!(transaction_id = %tx.id, error = %e, "Merchant lookup failed");
            }
        }
    }
}

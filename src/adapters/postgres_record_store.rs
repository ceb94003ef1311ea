//! Postgres implementation of RecordStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Merchant, Transaction, TransactionStatus};
use crate::ports::{RecordStore, StoreError, StoreResult};

const TRANSACTION_COLUMNS: &str = "id, amount, payment_method, source_account, destination_account, \
     reference, beneficiary, requester_phone, evidence_token, evidence_url, status, user_id, \
     created_at, updated_at";

/// Postgres-backed record store.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn user_exists(&self, user_id: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, amount, payment_method, source_account, destination_account,
                reference, beneficiary, requester_phone, evidence_token, evidence_url,
                status, user_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(tx.id)
        .bind(&tx.amount)
        .bind(&tx.payment_method)
        .bind(&tx.source_account)
        .bind(&tx.destination_account)
        .bind(&tx.reference)
        .bind(&tx.beneficiary)
        .bind(&tx.requester_phone)
        .bind(&tx.evidence_token)
        .bind(&tx.evidence_url)
        .bind(tx.status.as_str())
        .bind(&tx.user_id)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "UPDATE transactions SET status = $1, updated_at = $2 WHERE id = $3 RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(status.as_str())
        .bind(at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?
            .into_domain()
    }

    async fn set_evidence_url(&self, id: Uuid, url: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE transactions SET evidence_url = $1, updated_at = $2 WHERE id = $3")
                .bind(url)
                .bind(at)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("transaction {}", id)));
        }
        Ok(())
    }

    async fn list_by_status(&self, status: TransactionStatus) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE status = $1 ORDER BY created_at ASC",
            TRANSACTION_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn find_merchant_by_account(&self, account: &str) -> StoreResult<Option<Merchant>> {
        let row = sqlx::query_as::<_, MerchantRow>(
            "SELECT id, responsible, name, phone, accounts FROM merchants WHERE $1 = ANY(accounts) LIMIT 1",
        )
        .bind(account)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MerchantRow::into_domain))
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    amount: bigdecimal::BigDecimal,
    payment_method: String,
    source_account: String,
    destination_account: String,
    reference: String,
    beneficiary: String,
    requester_phone: String,
    evidence_token: Option<String>,
    evidence_url: Option<String>,
    status: String,
    user_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;

        Ok(Transaction {
            id: self.id,
            amount: self.amount,
            payment_method: self.payment_method,
            source_account: self.source_account,
            destination_account: self.destination_account,
            reference: self.reference,
            beneficiary: self.beneficiary,
            requester_phone: self.requester_phone,
            evidence_token: self.evidence_token,
            evidence_url: self.evidence_url,
            status,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MerchantRow {
    id: Uuid,
    responsible: String,
    name: String,
    phone: String,
    accounts: Vec<String>,
}

impl MerchantRow {
    fn into_domain(self) -> Merchant {
        Merchant {
            id: self.id,
            responsible: self.responsible,
            name: self.name,
            phone: self.phone,
            accounts: self.accounts,
        }
    }
}

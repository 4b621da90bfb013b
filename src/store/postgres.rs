//! PostgreSQL-backed transaction store.
//!
//! Uniqueness of `merchant_transaction_id` is enforced by a UNIQUE constraint on
//! the `payment_transactions` table; a unique violation is reported as
//! [`StoreError::Duplicate`] and never overwrites the existing row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};

use crate::db::DbPool;
use crate::models::transaction::{
    NewTransaction, PaymentTransaction, TransactionPatch, TransactionRow, TransactionStatus,
};
use crate::store::{StoreError, TransactionStore};

const COLUMNS: &str = "id, merchant_transaction_id, amount, payer_identifier, provider, status, \
     provider_transaction_id, provider_response, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgTransactionStore {
    pool: DbPool,
}

impl PgTransactionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn into_transactions(rows: Vec<TransactionRow>) -> Result<Vec<PaymentTransaction>, StoreError> {
    rows.into_iter().map(PaymentTransaction::try_from).collect()
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn create(&self, record: NewTransaction) -> Result<PaymentTransaction, StoreError> {
        let result = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO payment_transactions (
                merchant_transaction_id,
                amount,
                payer_identifier,
                provider,
                status
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&record.merchant_transaction_id)
        .bind(record.amount)
        .bind(&record.payer_identifier)
        .bind(&record.provider)
        .bind(TransactionStatus::Initiated.as_str())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.try_into(),
            // The UNIQUE constraint decides the race between concurrent initiations
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Duplicate(record.merchant_transaction_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_merchant_id(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<PaymentTransaction, StoreError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE merchant_transaction_id = $1"
        ))
        .bind(merchant_transaction_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(merchant_transaction_id.to_string()))?
        .try_into()
    }

    async fn update(
        &self,
        merchant_transaction_id: &str,
        patch: TransactionPatch,
    ) -> Result<PaymentTransaction, StoreError> {
        let expected = patch.expected_status;

        // COALESCE keeps the current value for every field the patch leaves unset
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE payment_transactions
            SET status = COALESCE($2, status),
                provider_transaction_id = COALESCE($3, provider_transaction_id),
                provider_response = COALESCE($4, provider_response),
                updated_at = NOW()
            WHERE merchant_transaction_id = $1
              AND ($5::text IS NULL OR status = $5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(merchant_transaction_id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.provider_transaction_id)
        .bind(patch.provider_response)
        .bind(expected.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        match (row, expected) {
            (Some(row), _) => row.try_into(),
            (None, None) => Err(StoreError::NotFound(merchant_transaction_id.to_string())),
            // Zero rows under a guard: either the record is gone or its status moved
            (None, Some(expected)) => {
                let current = self.find_by_merchant_id(merchant_transaction_id).await?;
                Err(StoreError::Conflict {
                    merchant_transaction_id: merchant_transaction_id.to_string(),
                    expected,
                    actual: current.status,
                })
            }
        }
    }

    async fn list_for_payer(
        &self,
        payer_identifier: &str,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM payment_transactions
            WHERE payer_identifier = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(payer_identifier)
        .fetch_all(&self.pool)
        .await?;

        into_transactions(rows)
    }

    async fn list_all(&self) -> Result<Vec<PaymentTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM payment_transactions ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        into_transactions(rows)
    }

    async fn list_stale(
        &self,
        statuses: &[TransactionStatus],
        older_than: Duration,
        limit: i64,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let cutoff = Utc::now() - TimeDelta::from_std(older_than).unwrap_or(TimeDelta::zero());

        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM payment_transactions
            WHERE status = ANY($1) AND updated_at < $2
            ORDER BY updated_at ASC
            LIMIT $3
            "#
        ))
        .bind(statuses)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_transactions(rows)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

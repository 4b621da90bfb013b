//! In-memory transaction store.
//!
//! Keeps every record in a `HashMap` keyed by merchant transaction id behind a
//! tokio `RwLock`. The first record stored under an id wins; later creates for the
//! same id fail with [`StoreError::Duplicate`]. Used by the test suites.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::transaction::{
    NewTransaction, PaymentTransaction, TransactionPatch, TransactionStatus,
};
use crate::store::{StoreError, TransactionStore};

#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    transactions: RwLock<HashMap<String, PaymentTransaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transactions.read().await.is_empty()
    }
}

fn newest_first(mut transactions: Vec<PaymentTransaction>) -> Vec<PaymentTransaction> {
    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    transactions
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, record: NewTransaction) -> Result<PaymentTransaction, StoreError> {
        let mut transactions = self.transactions.write().await;

        if transactions.contains_key(&record.merchant_transaction_id) {
            return Err(StoreError::Duplicate(record.merchant_transaction_id));
        }

        let now = Utc::now();
        let transaction = PaymentTransaction {
            id: Uuid::new_v4(),
            merchant_transaction_id: record.merchant_transaction_id,
            amount: record.amount,
            payer_identifier: record.payer_identifier,
            provider: record.provider,
            status: TransactionStatus::Initiated,
            provider_transaction_id: None,
            provider_response: None,
            created_at: now,
            updated_at: now,
        };

        transactions.insert(
            transaction.merchant_transaction_id.clone(),
            transaction.clone(),
        );
        Ok(transaction)
    }

    async fn find_by_merchant_id(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<PaymentTransaction, StoreError> {
        self.transactions
            .read()
            .await
            .get(merchant_transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(merchant_transaction_id.to_string()))
    }

    async fn update(
        &self,
        merchant_transaction_id: &str,
        patch: TransactionPatch,
    ) -> Result<PaymentTransaction, StoreError> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(merchant_transaction_id)
            .ok_or_else(|| StoreError::NotFound(merchant_transaction_id.to_string()))?;

        match patch.expected_status {
            Some(expected) if expected != transaction.status => {
                return Err(StoreError::Conflict {
                    merchant_transaction_id: merchant_transaction_id.to_string(),
                    expected,
                    actual: transaction.status,
                });
            }
            _ => {}
        }

        if let Some(status) = patch.status {
            transaction.status = status;
        }
        if let Some(id) = patch.provider_transaction_id {
            transaction.provider_transaction_id = Some(id);
        }
        if let Some(response) = patch.provider_response {
            transaction.provider_response = Some(response);
        }
        transaction.updated_at = Utc::now();

        Ok(transaction.clone())
    }

    async fn list_for_payer(
        &self,
        payer_identifier: &str,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        let transactions = self.transactions.read().await;
        Ok(newest_first(
            transactions
                .values()
                .filter(|t| t.payer_identifier == payer_identifier)
                .cloned()
                .collect(),
        ))
    }

    async fn list_all(&self) -> Result<Vec<PaymentTransaction>, StoreError> {
        let transactions = self.transactions.read().await;
        Ok(newest_first(transactions.values().cloned().collect()))
    }

    async fn list_stale(
        &self,
        statuses: &[TransactionStatus],
        older_than: Duration,
        limit: i64,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        let cutoff = Utc::now() - TimeDelta::from_std(older_than).unwrap_or(TimeDelta::zero());
        let transactions = self.transactions.read().await;

        let mut stale: Vec<PaymentTransaction> = transactions
            .values()
            .filter(|t| statuses.contains(&t.status) && t.updated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        stale.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(stale)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

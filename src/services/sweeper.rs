//! Periodic reconciliation of unsettled transactions.
//!
//! Callbacks can be lost (the payer closes the tab, the provider never redirects),
//! which would leave records PENDING or UNKNOWN forever. When enabled, the sweeper
//! wakes up every `RECONCILE_INTERVAL_SECS`, picks the records in those states that
//! have not changed for `RECONCILE_MIN_AGE_SECS`, and reconciles them one by one.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

use crate::gateway::PaymentGateway;
use crate::models::transaction::TransactionStatus;
use crate::services::reconciliation_service;
use crate::store::TransactionStore;

/// Records reconciled per tick at most.
const BATCH_SIZE: i64 = 100;

pub struct ReconcileSweeper {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    interval: Duration,
    min_age: Duration,
}

impl ReconcileSweeper {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        interval: Duration,
        min_age: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            interval,
            min_age,
        }
    }

    /// Run until the task is dropped.
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            min_age_secs = self.min_age.as_secs(),
            "Starting reconciliation sweeper"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let reconciled = self.sweep_once().await;
            if reconciled > 0 {
                tracing::info!(reconciled, "Reconciliation sweep finished");
            }
        }
    }

    /// Reconcile one batch of stale records and return how many were visited.
    pub async fn sweep_once(&self) -> usize {
        let stale = match self
            .store
            .list_stale(TransactionStatus::unsettled(), self.min_age, BATCH_SIZE)
            .await
        {
            Ok(stale) => stale,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list unsettled transactions");
                return 0;
            }
        };

        tracing::debug!(count = stale.len(), "Sweeping unsettled transactions");

        for transaction in &stale {
            reconciliation_service::reconcile(
                self.store.as_ref(),
                self.gateway.as_ref(),
                &transaction.merchant_transaction_id,
            )
            .await;
        }

        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::gateway::GatewayError;
    use crate::gateway::testing::ScriptedGateway;
    use crate::models::transaction::{NewTransaction, TransactionPatch};
    use crate::store::InMemoryTransactionStore;

    async fn create(store: &InMemoryTransactionStore, id: &str, status: TransactionStatus) {
        store
            .create(NewTransaction {
                merchant_transaction_id: id.to_string(),
                amount: 100,
                payer_identifier: "alice".to_string(),
                provider: "scripted".to_string(),
            })
            .await
            .unwrap();
        store
            .update(id, TransactionPatch::status(status))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    #[tokio::test]
    async fn settles_stale_pending_and_unknown_records() {
        let store = Arc::new(InMemoryTransactionStore::new());
        create(&store, "pending", TransactionStatus::Pending).await;
        create(&store, "unknown", TransactionStatus::Unknown).await;
        create(&store, "done", TransactionStatus::Success).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        // Oldest first: "pending" is reconciled before "unknown"
        let gateway = Arc::new(
            ScriptedGateway::new()
                .on_status(Ok(json!({ "success": true, "data": { "status": "SUCCESS" } })))
                .on_status(Err(GatewayError::Transport {
                    message: "timed out".to_string(),
                })),
        );

        let sweeper = ReconcileSweeper::new(
            store.clone(),
            gateway.clone(),
            Duration::from_secs(60),
            Duration::from_millis(1),
        );

        assert_eq!(sweeper.sweep_once().await, 2);
        assert_eq!(gateway.status_calls(), 2);

        let status = |id: &'static str| {
            let store = store.clone();
            async move { store.find_by_merchant_id(id).await.unwrap().status }
        };
        assert_eq!(status("pending").await, TransactionStatus::Success);
        assert_eq!(status("unknown").await, TransactionStatus::Unknown);
        assert_eq!(status("done").await, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn fresh_records_are_left_alone() {
        let store = Arc::new(InMemoryTransactionStore::new());
        create(&store, "pending", TransactionStatus::Pending).await;
        let gateway = Arc::new(ScriptedGateway::new());

        let sweeper = ReconcileSweeper::new(
            store,
            gateway.clone(),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        );

        assert_eq!(sweeper.sweep_once().await, 0);
        assert_eq!(gateway.status_calls(), 0);
    }
}

//! Payment initiation service.
//!
//! This service handles:
//! - Recording every payment attempt before the provider is contacted
//! - Sending the signed pay request through the gateway
//! - Recording the provisional outcome (PENDING or FAILED)
//!
//! # Store Writes
//!
//! At most two per call: the INITIATED insert, then one update once the gateway
//! answers. If the insert fails (for example the id is already taken) the
//! provider is still called, but the existing record is never touched; that
//! attempt is then only visible in the logs. The update only lands while the
//! record is still INITIATED, so a reconciliation that finished during the pay
//! call keeps its result.

use serde_json::Value;

use crate::error::AppError;
use crate::gateway::PaymentGateway;
use crate::models::payment::PaymentRequest;
use crate::models::transaction::{NewTransaction, StatusEvent, TransactionPatch, TransactionStatus};
use crate::store::{StoreError, TransactionStore};

/// Start a payment with the provider.
///
/// # Process
///
/// 1. Insert an INITIATED record
/// 2. Call the gateway
/// 3. Move the record to PENDING (accepted) or FAILED (error), storing the raw payload
///
/// # Returns
///
/// The raw provider response, which carries the redirect URL for the payer.
///
/// # Errors
///
/// - `Transport`: provider unreachable or timed out
/// - `ProviderRejection`: provider refused the merchant configuration
/// - `UnknownProvider`: any other provider failure
pub async fn initiate_payment(
    store: &dyn TransactionStore,
    gateway: &dyn PaymentGateway,
    request: PaymentRequest,
) -> Result<Value, AppError> {
    let merchant_transaction_id = request.merchant_transaction_id.clone();

    let recorded = match store
        .create(NewTransaction {
            merchant_transaction_id: request.merchant_transaction_id.clone(),
            amount: request.amount,
            payer_identifier: request.payer_identifier.clone(),
            provider: gateway.name().to_string(),
        })
        .await
    {
        Ok(_) => true,
        Err(StoreError::Duplicate(_)) => {
            tracing::warn!(
                %merchant_transaction_id,
                "Transaction id already exists, calling provider without a local record"
            );
            false
        }
        Err(e) => {
            tracing::error!(
                %merchant_transaction_id,
                error = %e,
                "Failed to create transaction record, calling provider without a local record"
            );
            false
        }
    };

    match gateway.initiate(&request).await {
        Ok(reply) => {
            tracing::info!(
                %merchant_transaction_id,
                provider = gateway.name(),
                amount = request.amount,
                "Payment initiated"
            );
            if recorded {
                record_initiation(
                    store,
                    &merchant_transaction_id,
                    StatusEvent::InitiationAccepted,
                    reply.raw.clone(),
                )
                .await;
            }
            Ok(reply.raw)
        }
        Err(err) => {
            tracing::error!(
                %merchant_transaction_id,
                provider = gateway.name(),
                error = %err,
                payload = %err.payload(),
                "Payment initiation failed"
            );
            if recorded {
                record_initiation(
                    store,
                    &merchant_transaction_id,
                    StatusEvent::InitiationFailed,
                    err.payload(),
                )
                .await;
            }
            Err(err.into())
        }
    }
}

/// Second and last write of an initiation, guarded on the INITIATED status this
/// call created the record with.
async fn record_initiation(
    store: &dyn TransactionStore,
    merchant_transaction_id: &str,
    event: StatusEvent,
    response: Value,
) {
    let status = TransactionStatus::Initiated.apply(&event);
    let patch = TransactionPatch::status(status)
        .with_response(response)
        .only_from(TransactionStatus::Initiated);

    // The provider has already answered; the caller still gets that answer
    match store.update(merchant_transaction_id, patch).await {
        Ok(_) => {}
        Err(StoreError::Conflict { actual, .. }) => {
            tracing::info!(
                merchant_transaction_id,
                current = %actual,
                "Transaction was reconciled during initiation, keeping its status"
            );
        }
        Err(e) => {
            tracing::error!(
                merchant_transaction_id,
                %status,
                error = %e,
                "Failed to record initiation outcome"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::gateway::testing::ScriptedGateway;
    use crate::gateway::{GatewayError, ProviderReply};
    use crate::store::InMemoryTransactionStore;

    /// Looks at the local record while the pay call is in flight and can settle
    /// it first, the way a fast callback would.
    struct ObservingGateway {
        store: Arc<InMemoryTransactionStore>,
        settle_before_answering: bool,
        seen: Mutex<Option<TransactionStatus>>,
    }

    impl ObservingGateway {
        fn new(store: Arc<InMemoryTransactionStore>, settle_before_answering: bool) -> Self {
            Self {
                store,
                settle_before_answering,
                seen: Mutex::new(None),
            }
        }

        fn seen(&self) -> Option<TransactionStatus> {
            *self.seen.lock().unwrap()
        }
    }

    #[async_trait]
    impl PaymentGateway for ObservingGateway {
        fn name(&self) -> &'static str {
            "observing"
        }

        async fn initiate(&self, request: &PaymentRequest) -> Result<ProviderReply, GatewayError> {
            let current = self
                .store
                .find_by_merchant_id(&request.merchant_transaction_id)
                .await
                .map(|t| t.status)
                .ok();
            *self.seen.lock().unwrap() = current;

            if self.settle_before_answering {
                self.store
                    .update(
                        &request.merchant_transaction_id,
                        TransactionPatch::status(TransactionStatus::Success)
                            .with_response(json!({ "code": "PAYMENT_SUCCESS" })),
                    )
                    .await
                    .unwrap();
            }

            Ok(ProviderReply::new(json!({ "success": true, "code": "PAYMENT_INITIATED" })))
        }

        async fn query_status(&self, _id: &str) -> Result<ProviderReply, GatewayError> {
            unreachable!("initiation never queries status")
        }
    }

    fn request(id: &str) -> PaymentRequest {
        PaymentRequest {
            merchant_transaction_id: id.to_string(),
            amount: 50000,
            payer_identifier: "9999999999".to_string(),
            redirect_url: "https://x/r".to_string(),
        }
    }

    #[tokio::test]
    async fn accepted_payment_becomes_pending() {
        let store = InMemoryTransactionStore::new();
        let provider_reply = json!({ "success": true, "data": { "redirect": "https://pay" } });
        let gateway = ScriptedGateway::new().on_initiate(Ok(provider_reply.clone()));

        let raw = initiate_payment(&store, &gateway, request("tx1")).await.unwrap();
        assert_eq!(raw, provider_reply);

        let stored = store.find_by_merchant_id("tx1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.amount, 50000);
        assert_eq!(stored.provider, "scripted");
        assert_eq!(stored.provider_response, Some(provider_reply));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn transport_failure_marks_failed_and_propagates() {
        let store = InMemoryTransactionStore::new();
        let gateway = ScriptedGateway::new().on_initiate(Err(GatewayError::Transport {
            message: "connection failed".to_string(),
        }));

        let err = initiate_payment(&store, &gateway, request("tx1")).await.unwrap_err();
        assert!(matches!(err, AppError::Transport { .. }));

        let stored = store.find_by_merchant_id("tx1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        assert_eq!(
            stored.provider_response,
            Some(json!({ "message": "connection failed" }))
        );
    }

    #[tokio::test]
    async fn rejection_keeps_provider_payload() {
        let store = InMemoryTransactionStore::new();
        let payload = json!({ "success": false, "code": "KEY_NOT_CONFIGURED" });
        let gateway = ScriptedGateway::new().on_initiate(Err(GatewayError::Rejected {
            code: "KEY_NOT_CONFIGURED".to_string(),
            payload: payload.clone(),
        }));

        let err = initiate_payment(&store, &gateway, request("tx1")).await.unwrap_err();
        match err {
            AppError::ProviderRejection { code, details } => {
                assert_eq!(code, "KEY_NOT_CONFIGURED");
                assert_eq!(details, payload);
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        let stored = store.find_by_merchant_id("tx1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        assert_eq!(stored.provider_response, Some(payload));
    }

    #[tokio::test]
    async fn duplicate_id_does_not_touch_existing_record() {
        let store = InMemoryTransactionStore::new();
        let gateway = ScriptedGateway::new()
            .on_initiate(Ok(json!({ "success": true, "attempt": 1 })))
            .on_initiate(Err(GatewayError::Provider {
                status: Some(400),
                payload: json!({ "code": "DUPLICATE_TXN" }),
            }));

        initiate_payment(&store, &gateway, request("tx1")).await.unwrap();
        let before = store.find_by_merchant_id("tx1").await.unwrap();

        let mut second = request("tx1");
        second.amount = 1;
        second.payer_identifier = "someone-else".to_string();
        let err = initiate_payment(&store, &gateway, second).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownProvider { status: Some(400), .. }));

        let after = store.find_by_merchant_id("tx1").await.unwrap();
        assert_eq!(gateway.initiate_calls(), 2);
        assert_eq!(after.status, TransactionStatus::Pending);
        assert_eq!(after.amount, before.amount);
        assert_eq!(after.payer_identifier, before.payer_identifier);
        assert_eq!(after.provider_response, before.provider_response);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn record_is_initiated_before_the_provider_is_called() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = ObservingGateway::new(store.clone(), false);

        initiate_payment(store.as_ref(), &gateway, request("tx1")).await.unwrap();

        assert_eq!(gateway.seen(), Some(TransactionStatus::Initiated));
        assert_eq!(
            store.find_by_merchant_id("tx1").await.unwrap().status,
            TransactionStatus::Pending
        );
    }

    #[tokio::test]
    async fn success_recorded_during_the_pay_call_is_kept() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = ObservingGateway::new(store.clone(), true);

        let raw = initiate_payment(store.as_ref(), &gateway, request("tx1")).await.unwrap();
        assert_eq!(raw["code"], "PAYMENT_INITIATED");

        let stored = store.find_by_merchant_id("tx1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
        assert_eq!(stored.provider_response, Some(json!({ "code": "PAYMENT_SUCCESS" })));
    }
}

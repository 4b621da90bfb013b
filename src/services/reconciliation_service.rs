//! Reconciliation of local transactions with the provider's system of record.
//!
//! This service handles:
//! - Resolving the merchant transaction id from an untrusted provider callback
//! - Querying the provider for the authoritative status
//! - Applying the result to the local record through [`TransactionStatus::apply`]
//! - Deciding where the payer's browser goes next
//!
//! # Failure Semantics
//!
//! Nothing in here returns an error. Every callback ends in a [`RedirectDecision`];
//! storage failures are logged at `warn` and otherwise ignored, since the
//! provider stays the source of truth and the record can be reconciled again.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as base64};
use serde_json::Value;
use url::form_urlencoded;

use crate::gateway::{PaymentGateway, ProviderOutcome};
use crate::models::transaction::{PaymentTransaction, StatusEvent, TransactionPatch};
use crate::store::{StoreError, TransactionStore};

/// Query parameters checked for the merchant transaction id, in priority order.
const QUERY_ID_KEYS: &[&str] = &["merchantTransactionId", "merchanttransactionid", "id"];

/// Body fields checked after the query string, in priority order.
const BODY_ID_KEYS: &[&str] = &["merchantTransactionId", "id"];

/// Body field that may carry a Base64-encoded JSON payload.
const EMBEDDED_PAYLOAD_KEY: &str = "request";

/// Compare-and-set attempts before a reconciliation write is abandoned.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Where to send the payer after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectDecision {
    Success,
    Failure,
}

impl RedirectDecision {
    /// Absolute frontend URL for this decision.
    pub fn location(&self, frontend_url: &str) -> String {
        let page = match self {
            RedirectDecision::Success => "success",
            RedirectDecision::Failure => "failure",
        };
        format!(
            "{}/process/payment/{page}",
            frontend_url.trim_end_matches('/')
        )
    }
}

/// Everything a provider callback carried: query string and (JSON or form) body.
#[derive(Debug, Clone, Default)]
pub struct CallbackPayload {
    pub query: HashMap<String, String>,
    pub body: HashMap<String, Value>,
}

impl CallbackPayload {
    /// Build a payload from a raw request body.
    ///
    /// Form bodies are recognised by their content type; anything else is tried as
    /// a JSON object first and as form data second. Unreadable bodies are treated
    /// as empty.
    pub fn from_parts(
        query: HashMap<String, String>,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Self {
        Self {
            query,
            body: parse_body(content_type, body),
        }
    }
}

fn parse_form(body: &[u8]) -> HashMap<String, Value> {
    form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect()
}

fn parse_body(content_type: Option<&str>, body: &[u8]) -> HashMap<String, Value> {
    if body.is_empty() {
        return HashMap::new();
    }

    let is_form = content_type
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        return parse_form(body);
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map.into_iter().collect(),
        Ok(_) => HashMap::new(),
        Err(_) => parse_form(body),
    }
}

/// Where a resolved identifier was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Query,
    Body,
    /// Decoded from the Base64 `request` field. Unsigned, so only a hint.
    EmbeddedPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    pub id: String,
    pub source: IdSource,
}

/// Non-empty string (or number) value of a JSON field.
fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decode_embedded(encoded: &str) -> Option<String> {
    let bytes = base64.decode(encoded.trim()).ok()?;
    let payload: Value = serde_json::from_slice(&bytes).ok()?;
    BODY_ID_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(id_value))
}

/// Find the merchant transaction id in a callback. The first source that yields
/// a non-empty value wins.
pub fn resolve_merchant_transaction_id(payload: &CallbackPayload) -> Option<ResolvedId> {
    let from_query = QUERY_ID_KEYS.iter().find_map(|key| {
        payload
            .query
            .get(*key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    });
    if let Some(id) = from_query {
        return Some(ResolvedId {
            id,
            source: IdSource::Query,
        });
    }

    let from_body = BODY_ID_KEYS
        .iter()
        .find_map(|key| payload.body.get(*key).and_then(id_value));
    if let Some(id) = from_body {
        return Some(ResolvedId {
            id,
            source: IdSource::Body,
        });
    }

    payload
        .body
        .get(EMBEDDED_PAYLOAD_KEY)
        .and_then(Value::as_str)
        .and_then(decode_embedded)
        .map(|id| ResolvedId {
            id,
            source: IdSource::EmbeddedPayload,
        })
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Normalized provider answer, `None` when the status query itself failed.
    pub reported: Option<ProviderOutcome>,
    /// The record as persisted, `None` when there was no local record or the write failed.
    pub transaction: Option<PaymentTransaction>,
}

impl Reconciliation {
    pub fn is_success(&self) -> bool {
        self.reported
            .as_ref()
            .is_some_and(ProviderOutcome::is_success)
    }
}

/// Query the provider for `merchant_transaction_id` and bring the local record in line.
///
/// A failed status query marks the record UNKNOWN with the error payload. The
/// provider answer is returned even when the local bookkeeping fails.
pub async fn reconcile(
    store: &dyn TransactionStore,
    gateway: &dyn PaymentGateway,
    merchant_transaction_id: &str,
) -> Reconciliation {
    let (reported, event, response) = match gateway.query_status(merchant_transaction_id).await {
        Ok(reply) => {
            tracing::info!(
                merchant_transaction_id,
                provider = gateway.name(),
                status = %reply.outcome.status(),
                "Provider status received"
            );
            let event = StatusEvent::StatusReported(reply.outcome.clone());
            (Some(reply.outcome), event, reply.raw)
        }
        Err(err) => {
            tracing::error!(
                merchant_transaction_id,
                provider = gateway.name(),
                error = %err,
                "Provider status query failed"
            );
            (None, StatusEvent::StatusQueryFailed, err.payload())
        }
    };

    let provider_transaction_id = reported
        .as_ref()
        .and_then(ProviderOutcome::provider_transaction_id)
        .map(str::to_string);

    let transaction = record_outcome(
        store,
        merchant_transaction_id,
        &event,
        response,
        provider_transaction_id,
    )
    .await;

    Reconciliation {
        reported,
        transaction,
    }
}

/// Best-effort write of a reconciliation result.
///
/// The event is applied to the status just read and written back only while
/// that status is unchanged. If another writer got there first, the record is
/// re-read and the event applied again, so a concurrent SUCCESS is never lost.
async fn record_outcome(
    store: &dyn TransactionStore,
    merchant_transaction_id: &str,
    event: &StatusEvent,
    response: Value,
    provider_transaction_id: Option<String>,
) -> Option<PaymentTransaction> {
    for _ in 0..MAX_WRITE_ATTEMPTS {
        let current = match store.find_by_merchant_id(merchant_transaction_id).await {
            Ok(transaction) => transaction,
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(merchant_transaction_id, "No local transaction to reconcile");
                return None;
            }
            Err(e) => {
                tracing::warn!(merchant_transaction_id, error = %e, "Failed to load transaction");
                return None;
            }
        };

        let status = current.status.apply(event);
        let patch = TransactionPatch::status(status)
            .with_response(response.clone())
            .with_provider_transaction_id(provider_transaction_id.clone())
            .only_from(current.status);

        match store.update(merchant_transaction_id, patch).await {
            Ok(updated) => {
                if updated.status != current.status {
                    tracing::info!(
                        merchant_transaction_id,
                        from = %current.status,
                        to = %updated.status,
                        "Transaction status changed"
                    );
                }
                return Some(updated);
            }
            Err(StoreError::Conflict { actual, .. }) => {
                tracing::debug!(
                    merchant_transaction_id,
                    read = %current.status,
                    now = %actual,
                    "Status moved while reconciling, retrying"
                );
            }
            Err(e) => {
                tracing::warn!(
                    merchant_transaction_id,
                    %status,
                    error = %e,
                    "Failed to record reconciliation"
                );
                return None;
            }
        }
    }

    tracing::warn!(
        merchant_transaction_id,
        attempts = MAX_WRITE_ATTEMPTS,
        "Gave up recording reconciliation, the status kept changing"
    );
    None
}

/// Handle the payer returning from the provider.
///
/// # Process
///
/// 1. Resolve the merchant transaction id; without one, fail without calling the provider
/// 2. Query the provider (the callback's own status is never trusted)
/// 3. Update the local record, best effort
/// 4. Redirect to success only if the fresh answer is SUCCESS
pub async fn handle_return(
    store: &dyn TransactionStore,
    gateway: &dyn PaymentGateway,
    payload: &CallbackPayload,
) -> RedirectDecision {
    let Some(resolved) = resolve_merchant_transaction_id(payload) else {
        tracing::warn!(
            query_keys = ?payload.query.keys().collect::<Vec<_>>(),
            body_keys = ?payload.body.keys().collect::<Vec<_>>(),
            "Payment return without a merchant transaction id"
        );
        return RedirectDecision::Failure;
    };

    if resolved.source == IdSource::EmbeddedPayload {
        tracing::warn!(
            merchant_transaction_id = %resolved.id,
            "Merchant transaction id taken from unsigned embedded payload"
        );
    }

    if reconcile(store, gateway, &resolved.id).await.is_success() {
        RedirectDecision::Success
    } else {
        RedirectDecision::Failure
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::Engine as _;
    use serde_json::json;

    use super::*;
    use crate::gateway::GatewayError;
    use crate::gateway::testing::ScriptedGateway;
    use crate::models::transaction::{NewTransaction, TransactionStatus};
    use crate::store::InMemoryTransactionStore;

    /// Lets a competing SUCCESS land between a reconciliation's read and its write.
    struct RacingStore {
        inner: InMemoryTransactionStore,
        race_pending: AtomicBool,
    }

    #[async_trait]
    impl TransactionStore for RacingStore {
        async fn create(&self, record: NewTransaction) -> Result<PaymentTransaction, StoreError> {
            self.inner.create(record).await
        }

        async fn find_by_merchant_id(&self, id: &str) -> Result<PaymentTransaction, StoreError> {
            self.inner.find_by_merchant_id(id).await
        }

        async fn update(
            &self,
            id: &str,
            patch: TransactionPatch,
        ) -> Result<PaymentTransaction, StoreError> {
            if self.race_pending.swap(false, Ordering::SeqCst) {
                self.inner
                    .update(
                        id,
                        TransactionPatch::status(TransactionStatus::Success)
                            .with_provider_transaction_id(Some("T-FAST".to_string())),
                    )
                    .await?;
            }
            self.inner.update(id, patch).await
        }

        async fn list_for_payer(&self, payer: &str) -> Result<Vec<PaymentTransaction>, StoreError> {
            self.inner.list_for_payer(payer).await
        }

        async fn list_all(&self) -> Result<Vec<PaymentTransaction>, StoreError> {
            self.inner.list_all().await
        }

        async fn list_stale(
            &self,
            statuses: &[TransactionStatus],
            older_than: Duration,
            limit: i64,
        ) -> Result<Vec<PaymentTransaction>, StoreError> {
            self.inner.list_stale(statuses, older_than, limit).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn callback_for(id: &str) -> CallbackPayload {
        CallbackPayload {
            query: query(&[("merchantTransactionId", id)]),
            body: HashMap::new(),
        }
    }

    async fn pending_store(id: &str) -> InMemoryTransactionStore {
        let store = InMemoryTransactionStore::new();
        store
            .create(NewTransaction {
                merchant_transaction_id: id.to_string(),
                amount: 50000,
                payer_identifier: "9999999999".to_string(),
                provider: "scripted".to_string(),
            })
            .await
            .unwrap();
        store
            .update(id, TransactionPatch::status(TransactionStatus::Pending))
            .await
            .unwrap();
        store
    }

    #[test]
    fn query_parameters_take_priority() {
        let payload = CallbackPayload {
            query: query(&[("id", "from-id"), ("merchanttransactionid", "lower")]),
            body: HashMap::from([("merchantTransactionId".to_string(), json!("body"))]),
        };

        assert_eq!(
            resolve_merchant_transaction_id(&payload),
            Some(ResolvedId {
                id: "lower".to_string(),
                source: IdSource::Query
            })
        );
    }

    #[test]
    fn empty_values_are_skipped() {
        let payload = CallbackPayload {
            query: query(&[("merchantTransactionId", "")]),
            body: HashMap::from([
                ("merchantTransactionId".to_string(), json!("  ")),
                ("id".to_string(), json!("tx9")),
            ]),
        };

        let resolved = resolve_merchant_transaction_id(&payload).unwrap();
        assert_eq!(resolved.id, "tx9");
        assert_eq!(resolved.source, IdSource::Body);
    }

    #[test]
    fn embedded_payload_is_the_last_resort() {
        let encoded = base64.encode(r#"{"merchantTransactionId":"tx7","code":"PAYMENT_SUCCESS"}"#);
        let payload = CallbackPayload::from_parts(
            HashMap::new(),
            Some("application/x-www-form-urlencoded"),
            format!("request={}", form_urlencoded::byte_serialize(encoded.as_bytes()).collect::<String>())
                .as_bytes(),
        );

        assert_eq!(
            resolve_merchant_transaction_id(&payload),
            Some(ResolvedId {
                id: "tx7".to_string(),
                source: IdSource::EmbeddedPayload
            })
        );
    }

    #[test]
    fn garbage_embedded_payload_resolves_nothing() {
        let payload = CallbackPayload::from_parts(
            HashMap::new(),
            Some("application/json"),
            br#"{"request":"not base64!"}"#,
        );
        assert_eq!(resolve_merchant_transaction_id(&payload), None);
    }

    #[test]
    fn json_bodies_are_read() {
        let payload = CallbackPayload::from_parts(
            HashMap::new(),
            Some("application/json"),
            br#"{"merchantTransactionId":"tx3"}"#,
        );
        assert_eq!(resolve_merchant_transaction_id(&payload).unwrap().id, "tx3");
    }

    #[test]
    fn redirect_locations() {
        assert_eq!(
            RedirectDecision::Success.location("http://localhost:3000/"),
            "http://localhost:3000/process/payment/success"
        );
        assert_eq!(
            RedirectDecision::Failure.location("https://shop.example"),
            "https://shop.example/process/payment/failure"
        );
    }

    #[tokio::test]
    async fn unresolvable_callback_fails_without_calling_provider() {
        let store = InMemoryTransactionStore::new();
        let gateway = ScriptedGateway::new();

        let decision = handle_return(&store, &gateway, &CallbackPayload::default()).await;

        assert_eq!(decision, RedirectDecision::Failure);
        assert_eq!(gateway.status_calls(), 0);
    }

    #[tokio::test]
    async fn confirmed_success_updates_record_and_redirects_to_success() {
        let store = pending_store("tx1").await;
        let gateway = ScriptedGateway::new().on_status(Ok(json!({
            "success": true,
            "data": { "status": "SUCCESS", "transactionId": "T123" }
        })));

        let decision = handle_return(&store, &gateway, &callback_for("tx1")).await;

        assert_eq!(decision, RedirectDecision::Success);
        let stored = store.find_by_merchant_id("tx1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
        assert_eq!(stored.provider_transaction_id.as_deref(), Some("T123"));
    }

    #[tokio::test]
    async fn pending_answer_keeps_pending_but_redirects_to_failure() {
        let store = pending_store("tx1").await;
        let gateway = ScriptedGateway::new()
            .on_status(Ok(json!({ "success": true, "data": { "status": "PENDING" } })));

        let decision = handle_return(&store, &gateway, &callback_for("tx1")).await;

        assert_eq!(decision, RedirectDecision::Failure);
        let stored = store.find_by_merchant_id("tx1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn query_timeout_marks_unknown_and_redirects_to_failure() {
        let store = pending_store("tx1").await;
        let gateway = ScriptedGateway::new().on_status(Err(GatewayError::Transport {
            message: "timed out".to_string(),
        }));

        let decision = handle_return(&store, &gateway, &callback_for("tx1")).await;

        assert_eq!(decision, RedirectDecision::Failure);
        let stored = store.find_by_merchant_id("tx1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Unknown);
        assert_eq!(stored.provider_response, Some(json!({ "message": "timed out" })));
    }

    #[tokio::test]
    async fn duplicate_callbacks_are_idempotent() {
        let store = pending_store("tx1").await;
        let answer = json!({ "success": true, "data": { "status": "SUCCESS", "transactionId": "T1" } });
        let gateway = ScriptedGateway::new()
            .on_status(Ok(answer.clone()))
            .on_status(Ok(answer));

        let first = handle_return(&store, &gateway, &callback_for("tx1")).await;
        let after_first = store.find_by_merchant_id("tx1").await.unwrap();
        let second = handle_return(&store, &gateway, &callback_for("tx1")).await;
        let after_second = store.find_by_merchant_id("tx1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first.status, after_second.status);
        assert_eq!(after_second.provider_transaction_id, after_first.provider_transaction_id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn missing_local_record_still_redirects() {
        let store = InMemoryTransactionStore::new();
        let gateway = ScriptedGateway::new()
            .on_status(Ok(json!({ "success": true, "data": { "status": "SUCCESS" } })));

        let decision = handle_return(&store, &gateway, &callback_for("ghost")).await;

        assert_eq!(decision, RedirectDecision::Success);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn late_failure_never_downgrades_success() {
        let store = pending_store("tx1").await;
        let gateway = ScriptedGateway::new()
            .on_status(Ok(json!({ "success": true, "data": { "status": "SUCCESS" } })))
            .on_status(Ok(json!({ "success": false, "code": "PAYMENT_ERROR" })));

        reconcile(&store, &gateway, "tx1").await;
        let second = reconcile(&store, &gateway, "tx1").await;

        assert!(!second.is_success());
        let stored = second.transaction.unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
        assert_eq!(stored.provider_response, Some(json!({ "success": false, "code": "PAYMENT_ERROR" })));
    }

    #[tokio::test]
    async fn concurrent_success_survives_a_stale_failure_report() {
        let store = RacingStore {
            inner: pending_store("tx1").await,
            race_pending: AtomicBool::new(true),
        };
        let gateway = ScriptedGateway::new()
            .on_status(Ok(json!({ "success": false, "data": { "status": "FAILED" } })));

        let reconciliation = reconcile(&store, &gateway, "tx1").await;

        assert!(!reconciliation.is_success());
        let stored = store.find_by_merchant_id("tx1").await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
        assert_eq!(stored.provider_transaction_id.as_deref(), Some("T-FAST"));
        assert_eq!(
            stored.provider_response,
            Some(json!({ "success": false, "data": { "status": "FAILED" } }))
        );
        assert_eq!(reconciliation.transaction.map(|t| t.status), Some(TransactionStatus::Success));
    }
}

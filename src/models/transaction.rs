//! Payment transaction data models.
//!
//! This module defines:
//! - `PaymentTransaction`: the record of one payment attempt, keyed by the merchant transaction id
//! - `TransactionStatus` and `StatusEvent`: the reconciliation state machine
//! - `NewTransaction` / `TransactionPatch`: the inputs accepted by the transaction store
//!
//! # Amount Storage
//!
//! Amounts are stored as `i64` minor units (paisa, cents). The conversion from the
//! major-unit value a client sends happens once, in [`crate::models::payment`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::gateway::ProviderOutcome;
use crate::store::StoreError;

/// Local status of a payment attempt.
///
/// ```text
/// INITIATED ──accepted──> PENDING ──status query──> SUCCESS | PENDING | FAILED
///     │                      │
///     └──rejected──> FAILED  └──query failed──> UNKNOWN
/// ```
///
/// FAILED and UNKNOWN are revisited whenever the provider is queried again, so a
/// late confirmation can still move them to SUCCESS. SUCCESS is never downgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Initiated,
    Pending,
    Success,
    Failed,
    Unknown,
}

/// Something that happened to a transaction and may change its status.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// The provider accepted the pay request.
    InitiationAccepted,
    /// The pay request failed (transport error or provider rejection).
    InitiationFailed,
    /// A fresh status query returned this normalized outcome.
    StatusReported(ProviderOutcome),
    /// The status query itself could not be completed.
    StatusQueryFailed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "INITIATED",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Unknown => "UNKNOWN",
        }
    }

    /// Compute the status that follows `event`.
    ///
    /// Events that do not apply to the current state leave it unchanged, so
    /// replaying the same event (duplicate callbacks) is harmless.
    pub fn apply(self, event: &StatusEvent) -> TransactionStatus {
        use TransactionStatus::*;

        match (self, event) {
            (Initiated, StatusEvent::InitiationAccepted) => Pending,
            (Initiated, StatusEvent::InitiationFailed) => Failed,
            (current, StatusEvent::InitiationAccepted | StatusEvent::InitiationFailed) => current,

            (Success, StatusEvent::StatusReported(_) | StatusEvent::StatusQueryFailed) => Success,
            (_, StatusEvent::StatusReported(outcome)) => outcome.status(),
            (_, StatusEvent::StatusQueryFailed) => Unknown,
        }
    }

    /// Statuses the reconciliation sweeper revisits.
    pub fn unsettled() -> &'static [TransactionStatus] {
        &[TransactionStatus::Pending, TransactionStatus::Unknown]
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(TransactionStatus::Initiated),
            "PENDING" => Ok(TransactionStatus::Pending),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAILED" => Ok(TransactionStatus::Failed),
            "UNKNOWN" => Ok(TransactionStatus::Unknown),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// A payment attempt as seen by the rest of the application.
///
/// # JSON Example
///
/// ```json
/// {
///   "merchantTransactionId": "tx1",
///   "amount": 50000,
///   "payerIdentifier": "9999999999",
///   "provider": "phonepe",
///   "status": "PENDING",
///   "providerTransactionId": null,
///   "providerResponse": { "success": true, "code": "PAYMENT_INITIATED" },
///   "createdAt": "2025-12-20T10:00:00Z",
///   "updatedAt": "2025-12-20T10:00:01Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    #[serde(skip)]
    pub id: Uuid,

    /// Caller-supplied correlation key, unique across all transactions
    pub merchant_transaction_id: String,

    /// Amount in minor units. Never changes after creation.
    pub amount: i64,

    /// Opaque payer reference (phone number, user id)
    pub payer_identifier: String,

    /// Provider the attempt was sent to, e.g. "phonepe"
    pub provider: String,

    pub status: TransactionStatus,

    /// Provider-side id, once the provider reports one
    pub provider_transaction_id: Option<String>,

    /// Last raw provider response or error payload, kept for audit
    pub provider_response: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation
    pub updated_at: DateTime<Utc>,
}

/// Row shape of the `payment_transactions` table.
///
/// `status` is stored as TEXT guarded by a CHECK constraint and parsed into
/// [`TransactionStatus`] on the way out.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub merchant_transaction_id: String,
    pub amount: i64,
    pub payer_identifier: String,
    pub provider: String,
    pub status: String,
    pub provider_transaction_id: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(StoreError::InvalidRecord)?;

        Ok(Self {
            id: row.id,
            merchant_transaction_id: row.merchant_transaction_id,
            amount: row.amount,
            payer_identifier: row.payer_identifier,
            provider: row.provider,
            status,
            provider_transaction_id: row.provider_transaction_id,
            provider_response: row.provider_response,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input for creating a transaction record. New records always start INITIATED.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub merchant_transaction_id: String,
    pub amount: i64,
    pub payer_identifier: String,
    pub provider: String,
}

/// Fields a store update may change. `None` leaves the column untouched.
///
/// Amount is immutable, so it has no field here. When `expected_status` is set
/// the store applies the patch only if the record still has that status, and
/// answers [`StoreError::Conflict`] otherwise.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub status: Option<TransactionStatus>,
    pub provider_transaction_id: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    pub expected_status: Option<TransactionStatus>,
}

impl TransactionPatch {
    pub fn status(status: TransactionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_response(mut self, response: serde_json::Value) -> Self {
        self.provider_response = Some(response);
        self
    }

    pub fn with_provider_transaction_id(mut self, id: Option<String>) -> Self {
        self.provider_transaction_id = id;
        self
    }

    /// Only apply the patch while the record is still in `status`.
    pub fn only_from(mut self, status: TransactionStatus) -> Self {
        self.expected_status = Some(status);
        self
    }
}

/// Response body for the transaction listing endpoints.
#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub count: usize,
    pub transactions: Vec<PaymentTransaction>,
}

impl From<Vec<PaymentTransaction>> for TransactionListResponse {
    fn from(transactions: Vec<PaymentTransaction>) -> Self {
        Self {
            count: transactions.len(),
            transactions,
        }
    }
}

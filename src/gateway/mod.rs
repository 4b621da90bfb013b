//! Payment provider adapters.
//!
//! A gateway turns a validated payment request into a signed provider call and
//! turns the provider's answer into a [`ProviderOutcome`]. The services only see
//! the [`PaymentGateway`] trait, so the provider can be swapped (or scripted in
//! tests) without touching the initiation or reconciliation logic.
//!
//! # Error Taxonomy
//!
//! - `Configuration`: credentials or endpoints missing/invalid, never retried
//! - `Transport`: no response at all (DNS, connect, timeout)
//! - `Rejected`: the provider answered with a structured configuration rejection
//! - `Provider`: any other non-success answer, with the raw status and payload

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::models::payment::PaymentRequest;
use crate::models::transaction::TransactionStatus;

pub mod phonepe;
pub mod razorpay;
pub mod signing;
pub mod stripe;

pub use phonepe::PhonePeGateway;
pub use razorpay::RazorpayClient;
pub use stripe::StripeClient;

/// Errors raised while talking to a payment provider.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Configuration(String),

    #[error("provider unreachable: {message}")]
    Transport { message: String },

    #[error("provider rejected the request: {code}")]
    Rejected { code: String, payload: Value },

    #[error("provider returned an error")]
    Provider { status: Option<u16>, payload: Value },
}

impl GatewayError {
    /// Raw payload to persist as the transaction's `providerResponse`.
    pub fn payload(&self) -> Value {
        match self {
            GatewayError::Configuration(message) | GatewayError::Transport { message } => {
                json!({ "message": message })
            }
            GatewayError::Rejected { payload, .. } | GatewayError::Provider { payload, .. } => {
                payload.clone()
            }
        }
    }

    pub(crate) fn transport(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timed out"
        } else if err.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };

        GatewayError::Transport {
            message: format!("{kind}: {err}"),
        }
    }
}

/// A provider answer normalized onto the local status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Success {
        provider_transaction_id: Option<String>,
    },
    Pending {
        provider_transaction_id: Option<String>,
    },
    Failure {
        code: Option<String>,
        message: Option<String>,
    },
}

fn str_field(value: Option<&Value>, key: &str) -> Option<String> {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl ProviderOutcome {
    /// Normalize a raw provider response.
    ///
    /// A nested `data.status` decides when present (case-insensitive `SUCCESS`
    /// or `PENDING`, anything else is a failure). Without it, only an explicit
    /// top-level `success: true` counts as success.
    pub fn normalize(raw: &Value) -> Self {
        let data = raw.get("data");
        let provider_transaction_id = str_field(data, "transactionId");
        let nested_status = str_field(data, "status").map(|s| s.to_uppercase());

        let succeeded = match nested_status.as_deref() {
            Some("SUCCESS") => true,
            Some("PENDING") => return ProviderOutcome::Pending { provider_transaction_id },
            Some(_) => false,
            None => raw.get("success").and_then(Value::as_bool) == Some(true),
        };

        if succeeded {
            ProviderOutcome::Success {
                provider_transaction_id,
            }
        } else {
            ProviderOutcome::Failure {
                code: str_field(Some(raw), "code"),
                message: str_field(Some(raw), "message"),
            }
        }
    }

    pub fn status(&self) -> TransactionStatus {
        match self {
            ProviderOutcome::Success { .. } => TransactionStatus::Success,
            ProviderOutcome::Pending { .. } => TransactionStatus::Pending,
            ProviderOutcome::Failure { .. } => TransactionStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProviderOutcome::Success { .. })
    }

    pub fn provider_transaction_id(&self) -> Option<&str> {
        match self {
            ProviderOutcome::Success {
                provider_transaction_id,
            }
            | ProviderOutcome::Pending {
                provider_transaction_id,
            } => provider_transaction_id.as_deref(),
            ProviderOutcome::Failure { .. } => None,
        }
    }
}

/// Raw provider response plus its normalized reading.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub raw: Value,
    pub outcome: ProviderOutcome,
}

impl ProviderReply {
    pub fn new(raw: Value) -> Self {
        let outcome = ProviderOutcome::normalize(&raw);
        Self { raw, outcome }
    }
}

/// A payment provider that supports redirect-style payments with status polling.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Short provider name stored on each transaction, e.g. "phonepe".
    fn name(&self) -> &'static str;

    /// Send a signed pay request.
    async fn initiate(&self, request: &PaymentRequest) -> Result<ProviderReply, GatewayError>;

    /// Ask the provider for the authoritative status of a payment.
    async fn query_status(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<ProviderReply, GatewayError>;
}

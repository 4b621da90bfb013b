//! Payment HTTP handlers.
//!
//! This module implements the payment endpoints:
//! - POST /payment/initiate - Start a PhonePe payment
//! - GET|POST /payment/return - Provider callback, always answered with a redirect
//! - GET /payment/transactions - Transactions of one payer
//! - GET /payment/transactions/all - Every transaction (admin)
//! - POST /payment/transactions/{merchantTransactionId}/reconcile - Re-query the provider (admin)
//! - POST /payment/razorpay/order - Create a Razorpay order
//! - POST /payment/stripe/intent - Create a Stripe payment intent
//! - GET /payment/stripe/key - Publishable Stripe key

use std::collections::HashMap;

use axum::{
    Json,
    body::{self, Body, Bytes},
    extract::{Path, Query, Request, State},
    http::header,
    response::Redirect,
};
use serde_json::Value;
use url::form_urlencoded;

use crate::{
    error::AppError,
    models::payment::{
        InitiatePaymentRequest, PayerQuery, RazorpayOrderRequest, RazorpayOrderResponse,
        ReconcileResponse, StripeIntentRequest, StripeIntentResponse, StripeKeyResponse,
    },
    models::transaction::TransactionListResponse,
    services::{
        payment_service, query_service,
        reconciliation_service::{self, CallbackPayload},
    },
    state::AppState,
};

/// Largest callback body that is read; anything bigger is treated as empty.
const MAX_CALLBACK_BODY: usize = 64 * 1024;

/// Start a payment.
///
/// # Request Body
///
/// ```json
/// {
///   "merchantTransactionId": "tx1",
///   "amount": 500,
///   "payerIdentifier": "9999999999",
///   "redirectUrl": "https://shop.example/api/payment/return"
/// }
/// ```
///
/// `amount` is in major units (rupees). `payerIdentifier` may also be sent as
/// `userPhone` or `merchantUserId`. The body is read as JSON whatever the
/// `Content-Type`, and every malformed body is answered with a 400 listing the
/// problem.
///
/// # Response (200)
///
/// The provider's raw response, which contains the pay page URL.
pub async fn initiate_payment(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let request = InitiatePaymentRequest::from_json(&body)?.validate()?;

    let payload =
        payment_service::initiate_payment(state.store.as_ref(), state.gateway.as_ref(), request)
            .await?;

    Ok(Json(payload))
}

/// Provider return/callback.
///
/// Accepts GET and POST (JSON or form bodies). Whatever happens, the response is
/// a redirect to `{FRONTEND_URL}/process/payment/success` or `/failure`.
pub async fn payment_return(State(state): State<AppState>, request: Request) -> Redirect {
    let (parts, body) = request.into_parts();

    let query: HashMap<String, String> = parts
        .uri
        .query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let bytes = read_body(body).await;
    let payload = CallbackPayload::from_parts(query, content_type, &bytes);

    let decision =
        reconciliation_service::handle_return(state.store.as_ref(), state.gateway.as_ref(), &payload)
            .await;

    Redirect::to(&decision.location(&state.frontend_url))
}

async fn read_body(body: Body) -> Vec<u8> {
    match body::to_bytes(body, MAX_CALLBACK_BODY).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable callback body");
            Vec::new()
        }
    }
}

/// List a payer's transactions, newest first.
///
/// # Query Parameters
///
/// - `payerIdentifier` (required, `merchantUserId` also accepted)
///
/// # Response (200)
///
/// ```json
/// { "count": 1, "transactions": [ { "merchantTransactionId": "tx1", "status": "SUCCESS", ... } ] }
/// ```
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<PayerQuery>,
) -> Result<Json<TransactionListResponse>, AppError> {
    let listing =
        query_service::list_for_payer(state.store.as_ref(), query.payer_identifier.as_deref())
            .await?;
    Ok(Json(listing))
}

/// List every transaction, newest first. Requires the admin key.
pub async fn list_all_transactions(
    State(state): State<AppState>,
) -> Result<Json<TransactionListResponse>, AppError> {
    Ok(Json(query_service::list_all(state.store.as_ref()).await?))
}

/// Re-query the provider for one transaction and update it. Requires the admin key.
///
/// # Response (200)
///
/// ```json
/// { "merchantTransactionId": "tx1", "status": "SUCCESS", "providerStatus": "SUCCESS" }
/// ```
///
/// `providerStatus` is `null` when the status query failed; the record is then UNKNOWN
/// (unless it was already SUCCESS).
///
/// # Errors
///
/// - 404 if there is no local record for the id
pub async fn reconcile_transaction(
    State(state): State<AppState>,
    Path(merchant_transaction_id): Path<String>,
) -> Result<Json<ReconcileResponse>, AppError> {
    state
        .store
        .find_by_merchant_id(&merchant_transaction_id)
        .await?;

    let reconciliation = reconciliation_service::reconcile(
        state.store.as_ref(),
        state.gateway.as_ref(),
        &merchant_transaction_id,
    )
    .await;

    let transaction = match reconciliation.transaction {
        Some(transaction) => transaction,
        None => {
            state
                .store
                .find_by_merchant_id(&merchant_transaction_id)
                .await?
        }
    };

    Ok(Json(ReconcileResponse {
        merchant_transaction_id,
        status: transaction.status,
        provider_status: reconciliation.reported.map(|outcome| outcome.status()),
    }))
}

/// Create a Razorpay order.
///
/// # Request Body
///
/// ```json
/// { "amount": 49900 }
/// ```
///
/// `amount` is in paisa.
///
/// # Response (200)
///
/// ```json
/// { "orderId": "order_Nx..." }
/// ```
pub async fn create_razorpay_order(
    State(state): State<AppState>,
    Json(request): Json<RazorpayOrderRequest>,
) -> Result<Json<RazorpayOrderResponse>, AppError> {
    let client = state.razorpay.as_ref().ok_or_else(|| {
        AppError::Configuration("Razorpay credentials are not configured".to_string())
    })?;

    let amount = positive_amount(request.amount)?;

    let order = client.create_order(amount).await?;
    tracing::info!(order_id = %order.id, amount, "Razorpay order created");

    Ok(Json(RazorpayOrderResponse { order_id: order.id }))
}

fn positive_amount(amount: Option<i64>) -> Result<i64, AppError> {
    match amount {
        Some(amount) if amount > 0 => Ok(amount),
        Some(_) => Err(AppError::Validation(vec![
            "amount (must be positive)".to_string(),
        ])),
        None => Err(AppError::Validation(vec!["amount".to_string()])),
    }
}

/// Create a Stripe payment intent.
///
/// # Request Body
///
/// ```json
/// { "amount": 49900 }
/// ```
///
/// `amount` is in paisa.
///
/// # Response (200)
///
/// ```json
/// { "clientSecret": "pi_..._secret_..." }
/// ```
pub async fn create_stripe_intent(
    State(state): State<AppState>,
    Json(request): Json<StripeIntentRequest>,
) -> Result<Json<StripeIntentResponse>, AppError> {
    let client = state.stripe.as_ref().ok_or_else(|| {
        AppError::Configuration("Stripe secret key is not configured".to_string())
    })?;

    let amount = positive_amount(request.amount)?;

    let intent = client.create_payment_intent(amount).await?;
    tracing::info!(intent_id = %intent.id, amount, "Stripe payment intent created");

    Ok(Json(StripeIntentResponse {
        client_secret: intent.client_secret,
    }))
}

/// Publishable Stripe key for the checkout page.
///
/// # Response (200)
///
/// ```json
/// { "stripeApiKey": "pk_test_..." }
/// ```
pub async fn stripe_api_key(
    State(state): State<AppState>,
) -> Result<Json<StripeKeyResponse>, AppError> {
    let key = state.stripe_publishable_key.clone().ok_or_else(|| {
        AppError::Configuration("Stripe publishable key is not configured".to_string())
    })?;

    Ok(Json(StripeKeyResponse { stripe_api_key: key }))
}

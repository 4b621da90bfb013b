//! Payment API request/response types.
//!
//! This module defines:
//! - `InitiatePaymentRequest`: body of `POST /payment/initiate`, validated into a `PaymentRequest`
//! - `RazorpayOrderRequest` / `RazorpayOrderResponse`: order creation with the second provider
//! - `StripeIntentRequest` / `StripeIntentResponse` / `StripeKeyResponse`: card payments with Stripe
//! - `ReconcileResponse`: result of a manual reconciliation
//! - `to_minor_units`: the single place where a major-unit amount becomes minor units

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::models::transaction::TransactionStatus;

/// Request body for starting a payment.
///
/// Every field is optional at the deserialization layer so that validation can
/// report all missing fields at once instead of failing on the first one. Text
/// fields also accept JSON numbers (`"payerIdentifier": 9999999999`).
///
/// The payer may be sent as `payerIdentifier`, `userPhone`, `merchantUserId` or
/// `merchant_user_id`; when several are present the first in that order wins.
///
/// # JSON Example
///
/// ```json
/// {
///   "merchantTransactionId": "tx1",
///   "amount": 500,
///   "payerIdentifier": "9999999999",
///   "redirectUrl": "https://shop.example/payment/return"
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub merchant_transaction_id: Option<Value>,

    /// Amount in major units (rupees, dollars), as a number or numeric string
    pub amount: Option<Value>,

    pub payer_identifier: Option<Value>,
    pub user_phone: Option<Value>,
    pub merchant_user_id: Option<Value>,
    #[serde(rename = "merchant_user_id")]
    pub merchant_user_id_snake: Option<Value>,

    pub redirect_url: Option<Value>,
}

/// A validated payment request. `amount` is already in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub merchant_transaction_id: String,
    pub amount: i64,
    pub payer_identifier: String,
    pub redirect_url: String,
}

/// Longest merchant transaction id the provider accepts.
pub const MAX_MERCHANT_TRANSACTION_ID_LEN: usize = 35;

/// Trimmed text of a string or number field; `None` when blank or another JSON type.
fn present(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|v| !v.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Letters, digits, `_` and `-` only, at most 35 characters.
pub fn is_valid_merchant_transaction_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_MERCHANT_TRANSACTION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl InitiatePaymentRequest {
    /// Parse a raw request body.
    ///
    /// The body must be a JSON object; the `Content-Type` header is not
    /// consulted. An empty body parses as an empty object so validation can
    /// name the missing fields. Repeated keys keep the last value.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` if the body is not a JSON object.
    pub fn from_json(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let not_an_object = || AppError::Validation(vec!["body (must be a JSON object)".to_string()]);

        let value: Value = serde_json::from_slice(body).map_err(|_| not_an_object())?;
        if !value.is_object() {
            return Err(not_an_object());
        }

        serde_json::from_value(value).map_err(|_| not_an_object())
    }

    /// Validate the request and convert the amount to minor units.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` listing every missing or malformed field.
    pub fn validate(self) -> Result<PaymentRequest, AppError> {
        let mut problems = Vec::new();

        let merchant_transaction_id = match present(self.merchant_transaction_id) {
            None => {
                problems.push("merchantTransactionId".to_string());
                None
            }
            Some(id) if !is_valid_merchant_transaction_id(&id) => {
                problems.push(format!(
                    "merchantTransactionId (letters, digits, '_' or '-' only, at most {MAX_MERCHANT_TRANSACTION_ID_LEN} characters)"
                ));
                None
            }
            Some(id) => Some(id),
        };

        let amount = match self.amount {
            None | Some(Value::Null) => {
                problems.push("amount".to_string());
                None
            }
            Some(value) => match to_minor_units(&value) {
                Ok(minor) => Some(minor),
                Err(reason) => {
                    problems.push(format!("amount ({reason})"));
                    None
                }
            },
        };

        let payer_identifier = present(self.payer_identifier)
            .or_else(|| present(self.user_phone))
            .or_else(|| present(self.merchant_user_id))
            .or_else(|| present(self.merchant_user_id_snake));
        if payer_identifier.is_none() {
            problems.push("payerIdentifier".to_string());
        }

        let redirect_url = present(self.redirect_url);
        if redirect_url.is_none() {
            problems.push("redirectUrl".to_string());
        }

        match (merchant_transaction_id, amount, payer_identifier, redirect_url) {
            (Some(merchant_transaction_id), Some(amount), Some(payer_identifier), Some(redirect_url))
                if problems.is_empty() =>
            {
                Ok(PaymentRequest {
                    merchant_transaction_id,
                    amount,
                    payer_identifier,
                    redirect_url,
                })
            }
            _ => Err(AppError::Validation(problems)),
        }
    }
}

/// Convert a major-unit amount into minor units (x100), rounding half away from zero.
///
/// Accepts JSON numbers and numeric strings. The conversion goes through a
/// decimal type so `10.07` becomes exactly `1007`.
pub fn to_minor_units(value: &Value) -> Result<i64, &'static str> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err("must be a number"),
    };

    let major = text
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| "must be a number")?;

    if major.is_sign_negative() && !major.is_zero() {
        return Err("must not be negative");
    }

    major
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|minor| minor.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|minor| minor.to_i64())
        .ok_or("is too large")
}

/// Request body for `POST /payment/razorpay/order`. Amount is already in paisa.
#[derive(Debug, Deserialize)]
pub struct RazorpayOrderRequest {
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RazorpayOrderResponse {
    pub order_id: String,
}

/// Request body for `POST /payment/stripe/intent`. Amount is already in paisa.
#[derive(Debug, Deserialize)]
pub struct StripeIntentRequest {
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeKeyResponse {
    pub stripe_api_key: String,
}

/// Query string of `GET /payment/transactions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerQuery {
    #[serde(alias = "merchantUserId")]
    pub payer_identifier: Option<String>,
}

/// Response of a manual reconciliation.
///
/// `providerStatus` is what the provider just reported (absent when the query
/// failed); `status` is the resulting local status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub merchant_transaction_id: String,
    pub status: TransactionStatus,
    pub provider_status: Option<TransactionStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> InitiatePaymentRequest {
        InitiatePaymentRequest::from_json(body.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn converts_major_units_once() {
        assert_eq!(to_minor_units(&json!(500)), Ok(50000));
        assert_eq!(to_minor_units(&json!(10.07)), Ok(1007));
        assert_eq!(to_minor_units(&json!("12.345")), Ok(1235));
        assert_eq!(to_minor_units(&json!(0)), Ok(0));
        assert_eq!(to_minor_units(&json!(1e2)), Ok(10000));
    }

    #[test]
    fn rejects_bad_amounts() {
        assert_eq!(to_minor_units(&json!(-1)), Err("must not be negative"));
        assert_eq!(to_minor_units(&json!("ten")), Err("must be a number"));
        assert_eq!(to_minor_units(&json!(true)), Err("must be a number"));
        assert_eq!(
            to_minor_units(&json!("100000000000000000000")),
            Err("is too large")
        );
    }

    #[test]
    fn validates_a_complete_request() {
        let validated = request(json!({
            "merchantTransactionId": "tx1",
            "amount": 500,
            "payerIdentifier": "9999999999",
            "redirectUrl": "https://x/r"
        }))
        .validate()
        .unwrap();

        assert_eq!(
            validated,
            PaymentRequest {
                merchant_transaction_id: "tx1".to_string(),
                amount: 50000,
                payer_identifier: "9999999999".to_string(),
                redirect_url: "https://x/r".to_string(),
            }
        );
    }

    #[test]
    fn accepts_payer_aliases() {
        let validated = request(json!({
            "merchantTransactionId": "tx1",
            "amount": "1",
            "userPhone": "9999999999",
            "redirectUrl": "https://x/r"
        }))
        .validate()
        .unwrap();

        assert_eq!(validated.payer_identifier, "9999999999");
        assert_eq!(validated.amount, 100);
    }

    #[test]
    fn reports_every_missing_field() {
        let err = request(json!({ "merchantTransactionId": "  " }))
            .validate()
            .unwrap_err();

        match err {
            AppError::Validation(fields) => assert_eq!(
                fields,
                vec!["merchantTransactionId", "amount", "payerIdentifier", "redirectUrl"]
            ),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn reports_negative_amount_with_other_fields() {
        let err = request(json!({ "amount": -5, "payerIdentifier": "p" }))
            .validate()
            .unwrap_err();

        match err {
            AppError::Validation(fields) => {
                assert!(fields.contains(&"amount (must not be negative)".to_string()));
                assert!(fields.contains(&"merchantTransactionId".to_string()));
                assert!(fields.contains(&"redirectUrl".to_string()));
                assert_eq!(fields.len(), 3);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_numeric_ids_and_payers() {
        let validated = request(json!({
            "merchantTransactionId": 12345,
            "amount": 1,
            "payerIdentifier": 9999999999u64,
            "redirectUrl": "https://x/r"
        }))
        .validate()
        .unwrap();

        assert_eq!(validated.merchant_transaction_id, "12345");
        assert_eq!(validated.payer_identifier, "9999999999");
    }

    #[test]
    fn payer_identifier_wins_over_its_aliases() {
        let body = br#"{
            "merchantTransactionId": "tx1",
            "amount": 1,
            "userPhone": "8888888888",
            "payerIdentifier": "9999999999",
            "merchant_user_id": "u1",
            "redirectUrl": "https://x/r"
        }"#;

        let validated = InitiatePaymentRequest::from_json(body)
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(validated.payer_identifier, "9999999999");

        let snake_only = request(json!({
            "merchantTransactionId": "tx1",
            "amount": 1,
            "merchant_user_id": "u1",
            "redirectUrl": "https://x/r"
        }))
        .validate()
        .unwrap();
        assert_eq!(snake_only.payer_identifier, "u1");
    }

    #[test]
    fn repeated_keys_keep_the_last_value() {
        let body = br#"{"merchantTransactionId":"a","merchantTransactionId":"b","amount":1,"payerIdentifier":"p","redirectUrl":"r"}"#;
        let validated = InitiatePaymentRequest::from_json(body)
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(validated.merchant_transaction_id, "b");
    }

    #[test]
    fn non_object_bodies_are_validation_errors() {
        for body in [&b"not json"[..], b"[1,2]", b"\"tx1\""] {
            match InitiatePaymentRequest::from_json(body) {
                Err(AppError::Validation(fields)) => {
                    assert_eq!(fields, vec!["body (must be a JSON object)"])
                }
                other => panic!("expected validation error, got {other:?}"),
            }
        }

        let empty = InitiatePaymentRequest::from_json(b"  ").unwrap();
        assert!(matches!(empty.validate(), Err(AppError::Validation(f)) if f.len() == 4));
    }

    #[test]
    fn merchant_transaction_id_is_restricted_to_safe_characters() {
        assert!(is_valid_merchant_transaction_id("order_2024-01"));
        assert!(!is_valid_merchant_transaction_id("a b"));
        assert!(!is_valid_merchant_transaction_id("a/b"));
        assert!(!is_valid_merchant_transaction_id("tx?1"));
        assert!(!is_valid_merchant_transaction_id(&"x".repeat(36)));

        let err = request(json!({
            "merchantTransactionId": "a/../b",
            "amount": 1,
            "payerIdentifier": "p",
            "redirectUrl": "r"
        }))
        .validate()
        .unwrap_err();
        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert!(fields[0].starts_with("merchantTransactionId ("));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}

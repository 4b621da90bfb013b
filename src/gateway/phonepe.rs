//! PhonePe gateway adapter.
//!
//! # Pay Request
//!
//! 1. Build the pay payload and Base64-encode its JSON
//! 2. Sign `base64 + /pg/v1/pay + saltKey` (see [`signing`])
//! 3. POST `{"request": base64}` with `X-VERIFY` and `X-KEY-INDEX` headers
//!
//! # Status Query
//!
//! GET `{statusUrl}/{merchantId}/{merchantTransactionId}` signed over
//! `/pg/v1/status/{merchantId}/{merchantTransactionId} + saltKey`, with an extra
//! `X-MERCHANT-ID` header. Both segments are signed exactly as they are sent,
//! percent-encoded.
//!
//! Both calls share the client timeout from configuration (15 seconds by default).

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

use crate::config::{Config, PhonePeConfig};
use crate::gateway::signing::{self, PAY_PATH};
use crate::gateway::{GatewayError, PaymentGateway, ProviderReply};
use crate::models::payment::PaymentRequest;

/// Provider codes that mean the merchant setup itself was refused.
const CONFIGURATION_REJECTIONS: &[&str] = &["KEY_NOT_CONFIGURED"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PayPayload<'a> {
    merchant_id: &'a str,
    merchant_transaction_id: &'a str,
    amount: i64,
    merchant_user_id: &'a str,
    redirect_url: &'a str,
    payment_instrument: PaymentInstrument,
}

#[derive(Debug, Serialize)]
struct PaymentInstrument {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone)]
pub struct PhonePeGateway {
    client: Client,
    merchant_id: String,
    salt_key: String,
    key_index: String,
    api_url: Url,
    status_url: Url,
}

fn parse_url(name: &str, value: &str) -> Result<Url, GatewayError> {
    Url::parse(value)
        .map_err(|e| GatewayError::Configuration(format!("{name} is not a valid URL ({e}): {value}")))
}

impl PhonePeGateway {
    /// Build the adapter from application configuration.
    ///
    /// # Errors
    ///
    /// `GatewayError::Configuration` if the merchant id or salt key is missing,
    /// an endpoint URL is malformed, or the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        Self::new(config.phonepe()?)
    }

    pub fn new(config: PhonePeConfig) -> Result<Self, GatewayError> {
        let api_url = parse_url("PHONEPE_API_URL", &config.api_url)?;
        let status_url = parse_url("PHONEPE_STATUS_URL", &config.status_url)?;
        if status_url.cannot_be_a_base() {
            return Err(GatewayError::Configuration(format!(
                "PHONEPE_STATUS_URL cannot be used as a base URL: {status_url}"
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            merchant_id: config.merchant_id,
            salt_key: config.salt_key,
            key_index: config.key_index,
            api_url,
            status_url,
        })
    }

    fn status_url_for(&self, merchant_transaction_id: &str) -> Url {
        let mut url = self.status_url.clone();
        // Checked in `new`: the status URL can be a base
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.merchant_id)
                .push(merchant_transaction_id);
        }
        url
    }
}

/// The signed path of a status URL: `/pg/v1/status/` plus its last two encoded segments.
fn signed_status_path(url: &Url) -> String {
    let mut segments = url.path().rsplitn(3, '/');
    let id = segments.next().unwrap_or_default();
    let merchant = segments.next().unwrap_or_default();
    signing::status_path(merchant, id)
}

/// Read a provider response, keeping the body even when it is not JSON.
async fn read_reply(response: Response) -> Result<ProviderReply, GatewayError> {
    let status = response.status();
    let text = response.text().await.map_err(GatewayError::transport)?;
    let raw = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    if status.is_success() {
        return Ok(ProviderReply::new(raw));
    }

    let code = raw.get("code").and_then(Value::as_str);
    match code {
        Some(code) if CONFIGURATION_REJECTIONS.contains(&code) => Err(GatewayError::Rejected {
            code: code.to_string(),
            payload: raw,
        }),
        _ => Err(GatewayError::Provider {
            status: Some(status.as_u16()),
            payload: raw,
        }),
    }
}

#[async_trait]
impl PaymentGateway for PhonePeGateway {
    fn name(&self) -> &'static str {
        "phonepe"
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<ProviderReply, GatewayError> {
        let payload = PayPayload {
            merchant_id: &self.merchant_id,
            merchant_transaction_id: &request.merchant_transaction_id,
            amount: request.amount,
            merchant_user_id: &request.payer_identifier,
            redirect_url: &request.redirect_url,
            payment_instrument: PaymentInstrument { kind: "PAY_PAGE" },
        };

        let encoded = signing::encode_payload(&payload).map_err(|e| GatewayError::Provider {
            status: None,
            payload: json!({ "message": format!("failed to encode pay payload: {e}") }),
        })?;
        let x_verify = signing::sign_request(&encoded, PAY_PATH, &self.salt_key, &self.key_index);

        tracing::debug!(
            merchant_transaction_id = %request.merchant_transaction_id,
            url = %self.api_url,
            "Sending PhonePe pay request"
        );

        let response = self
            .client
            .post(self.api_url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-VERIFY", x_verify)
            .header("X-KEY-INDEX", &self.key_index)
            .json(&json!({ "request": encoded }))
            .send()
            .await
            .map_err(GatewayError::transport)?;

        read_reply(response).await
    }

    async fn query_status(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<ProviderReply, GatewayError> {
        let url = self.status_url_for(merchant_transaction_id);
        let path = signed_status_path(&url);
        let x_verify = signing::sign_status(&path, &self.salt_key, &self.key_index);

        tracing::debug!(merchant_transaction_id, url = %url, "Querying PhonePe status");

        let response = self
            .client
            .get(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-VERIFY", x_verify)
            .header("X-KEY-INDEX", &self.key_index)
            .header("X-MERCHANT-ID", &self.merchant_id)
            .send()
            .await
            .map_err(GatewayError::transport)?;

        read_reply(response).await
    }
}

//! Razorpay order client.
//!
//! Creates checkout orders through `POST {apiUrl}/orders` with HTTP basic auth
//! (key id / key secret). Amounts are already in paisa. The client is optional:
//! without credentials the route reports a configuration error on first use.

use reqwest::Client;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::RazorpayConfig;
use crate::gateway::GatewayError;

#[derive(Debug, Clone)]
pub struct RazorpayClient {
    client: Client,
    key_id: String,
    key_secret: String,
    api_url: String,
}

/// A created order: its id and the raw provider response.
#[derive(Debug, Clone)]
pub struct RazorpayOrder {
    pub id: String,
    pub raw: Value,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            key_id: config.key_id,
            key_secret: config.key_secret,
            api_url: config.api_url,
        })
    }

    /// Create an INR order for `amount` paisa, captured automatically.
    pub async fn create_order(&self, amount: i64) -> Result<RazorpayOrder, GatewayError> {
        let body = json!({
            "amount": amount,
            "currency": "INR",
            "receipt": format!("rcpt_{}", Uuid::new_v4().simple()),
            "payment_capture": 1,
        });

        let response = self
            .client
            .post(format!("{}/orders", self.api_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::transport)?;

        let status = response.status();
        let text = response.text().await.map_err(GatewayError::transport)?;
        let raw = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            // Razorpay errors look like {"error": {"code": "...", "description": "..."}}
            let code = raw
                .pointer("/error/code")
                .and_then(Value::as_str)
                .map(str::to_string);

            return Err(match code {
                Some(code) if status.is_client_error() => GatewayError::Rejected { code, payload: raw },
                _ => GatewayError::Provider {
                    status: Some(status.as_u16()),
                    payload: raw,
                },
            });
        }

        match raw.get("id").and_then(Value::as_str) {
            Some(id) => Ok(RazorpayOrder {
                id: id.to_string(),
                raw,
            }),
            None => Err(GatewayError::Provider {
                status: Some(status.as_u16()),
                payload: raw,
            }),
        }
    }
}

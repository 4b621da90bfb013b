//! Stripe payment intent client.
//!
//! Creates intents through `POST {apiUrl}/payment_intents` with the secret key
//! as a bearer token and a form-encoded body. Amounts are already in paisa. The
//! browser confirms the intent with the returned client secret, so nothing is
//! recorded locally.

use reqwest::Client;
use serde_json::Value;

use crate::config::StripeConfig;
use crate::gateway::GatewayError;

const CURRENCY: &str = "inr";
const DESCRIPTION: &str = "Storefront order payment";

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_url: String,
}

/// A created payment intent.
#[derive(Debug, Clone)]
pub struct StripeIntent {
    pub id: String,
    pub client_secret: String,
    pub raw: Value,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            secret_key: config.secret_key,
            api_url: config.api_url,
        })
    }

    /// Create an INR payment intent for `amount` paisa.
    pub async fn create_payment_intent(&self, amount: i64) -> Result<StripeIntent, GatewayError> {
        let amount = amount.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", CURRENCY),
            ("description", DESCRIPTION),
            ("metadata[company]", "Ecommerce"),
        ];

        let response = self
            .client
            .post(format!("{}/payment_intents", self.api_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(GatewayError::transport)?;

        let status = response.status();
        let text = response.text().await.map_err(GatewayError::transport)?;
        let raw = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            // {"error": {"code": "...", "message": "...", "type": "invalid_request_error"}}
            let code = raw
                .pointer("/error/code")
                .or_else(|| raw.pointer("/error/type"))
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

        let id = raw.get("id").and_then(Value::as_str).map(str::to_string);
        let client_secret = raw
            .get("client_secret")
            .and_then(Value::as_str)
            .map(str::to_string);

        match (id, client_secret) {
            (Some(id), Some(client_secret)) => Ok(StripeIntent {
                id,
                client_secret,
                raw,
            }),
            _ => Err(GatewayError::Provider {
                status: Some(status.as_u16()),
                payload: raw,
            }),
        }
    }
}

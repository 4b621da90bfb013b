//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.
//! Provider credentials are validated separately (see [`Config::phonepe`]) so that a missing
//! merchant id or salt key stops the process at startup instead of on the first payment.

use std::time::Duration;

use serde::Deserialize;

use crate::gateway::GatewayError;

/// Sandbox endpoint for PhonePe pay requests.
pub const DEFAULT_PHONEPE_API_URL: &str =
    "https://api-preprod.phonepe.com/apis/pg-sandbox/pg/v1/pay";

/// Sandbox base for PhonePe status queries. `/{merchantId}/{merchantTransactionId}` is appended.
pub const DEFAULT_PHONEPE_STATUS_URL: &str =
    "https://api-preprod.phonepe.com/apis/pg-sandbox/pg/v1/status";

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PHONEPE_MERCHANT_ID`, `PHONEPE_SALT_KEY` (required at startup): provider credentials
/// - `PHONEPE_KEY_INDEX` (optional): salt key index, defaults to "1"
/// - `PHONEPE_API_URL`, `PHONEPE_STATUS_URL` (optional): sandbox defaults
/// - `PROVIDER_TIMEOUT_SECS` (optional): outbound timeout, defaults to 15 (0 also means 15)
/// - `FRONTEND_URL` (optional): redirect base and CORS origin
/// - `ADMIN_API_KEY` (optional): bearer key for privileged routes
/// - `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET`, `RAZORPAY_API_URL` (optional)
/// - `STRIPE_SECRET_KEY`, `STRIPE_API_KEY` (publishable), `STRIPE_API_URL` (optional)
/// - `RECONCILE_INTERVAL_SECS` (optional): sweeper period, 0 disables it
/// - `RECONCILE_MIN_AGE_SECS` (optional): minimum idle time before a record is swept
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub phonepe_merchant_id: Option<String>,

    #[serde(default)]
    pub phonepe_salt_key: Option<String>,

    #[serde(default = "default_key_index")]
    pub phonepe_key_index: String,

    #[serde(default = "default_phonepe_api_url")]
    pub phonepe_api_url: String,

    #[serde(default = "default_phonepe_status_url")]
    pub phonepe_status_url: String,

    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    #[serde(default)]
    pub admin_api_key: Option<String>,

    #[serde(default)]
    pub razorpay_key_id: Option<String>,

    #[serde(default)]
    pub razorpay_key_secret: Option<String>,

    #[serde(default = "default_razorpay_api_url")]
    pub razorpay_api_url: String,

    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    #[serde(default)]
    pub stripe_api_key: Option<String>,

    #[serde(default = "default_stripe_api_url")]
    pub stripe_api_url: String,

    #[serde(default)]
    pub reconcile_interval_secs: u64,

    #[serde(default = "default_reconcile_min_age_secs")]
    pub reconcile_min_age_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_key_index() -> String {
    "1".to_string()
}

fn default_phonepe_api_url() -> String {
    DEFAULT_PHONEPE_API_URL.to_string()
}

fn default_phonepe_status_url() -> String {
    DEFAULT_PHONEPE_STATUS_URL.to_string()
}

const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;

fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_razorpay_api_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_stripe_api_url() -> String {
    "https://api.stripe.com/v1".to_string()
}

fn default_reconcile_min_age_secs() -> u64 {
    60
}

/// Validated PhonePe credentials and endpoints.
///
/// Only obtainable through [`Config::phonepe`], so holding one means the
/// merchant id and salt key are present.
#[derive(Debug, Clone)]
pub struct PhonePeConfig {
    pub merchant_id: String,
    pub salt_key: String,
    pub key_index: String,
    pub api_url: String,
    pub status_url: String,
    pub timeout: Duration,
}

/// Validated Razorpay credentials.
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub api_url: String,
    pub timeout: Duration,
}

/// Validated Stripe settings. Only the secret key is needed to create intents.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_url: String,
    pub timeout: Duration,
}

/// Treat empty or whitespace-only values the same as unset ones.
fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Validate and extract the PhonePe settings.
    ///
    /// # Errors
    ///
    /// `GatewayError::Configuration` naming every missing credential.
    pub fn phonepe(&self) -> Result<PhonePeConfig, GatewayError> {
        let merchant_id = non_empty(&self.phonepe_merchant_id);
        let salt_key = non_empty(&self.phonepe_salt_key);

        let (merchant_id, salt_key) = match (merchant_id, salt_key) {
            (Some(m), Some(s)) => (m, s),
            (m, s) => {
                let mut missing = Vec::new();
                if m.is_none() {
                    missing.push("PHONEPE_MERCHANT_ID");
                }
                if s.is_none() {
                    missing.push("PHONEPE_SALT_KEY");
                }
                return Err(GatewayError::Configuration(format!(
                    "PhonePe configuration missing: {}",
                    missing.join(", ")
                )));
            }
        };

        let key_index = match self.phonepe_key_index.trim() {
            "" => default_key_index(),
            k => k.to_string(),
        };

        Ok(PhonePeConfig {
            merchant_id,
            salt_key,
            key_index,
            api_url: self.phonepe_api_url.clone(),
            status_url: self.phonepe_status_url.trim_end_matches('/').to_string(),
            timeout: self.provider_timeout(),
        })
    }

    /// Razorpay settings, or `None` when the key pair is not configured.
    pub fn razorpay(&self) -> Option<RazorpayConfig> {
        Some(RazorpayConfig {
            key_id: non_empty(&self.razorpay_key_id)?,
            key_secret: non_empty(&self.razorpay_key_secret)?,
            api_url: self.razorpay_api_url.trim_end_matches('/').to_string(),
            timeout: self.provider_timeout(),
        })
    }

    /// Stripe settings, or `None` when `STRIPE_SECRET_KEY` is not set.
    pub fn stripe(&self) -> Option<StripeConfig> {
        Some(StripeConfig {
            secret_key: non_empty(&self.stripe_secret_key)?,
            api_url: self.stripe_api_url.trim_end_matches('/').to_string(),
            timeout: self.provider_timeout(),
        })
    }

    /// Publishable Stripe key handed to the browser.
    pub fn stripe_publishable_key(&self) -> Option<String> {
        non_empty(&self.stripe_api_key)
    }

    pub fn admin_api_key(&self) -> Option<String> {
        non_empty(&self.admin_api_key)
    }

    /// Outbound provider timeout. Zero would fail every call, so it falls back to the default.
    pub fn provider_timeout(&self) -> Duration {
        match self.provider_timeout_secs {
            0 => Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Sweeper period, or `None` when periodic reconciliation is disabled.
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }

    pub fn reconcile_min_age(&self) -> Duration {
        Duration::from_secs(self.reconcile_min_age_secs)
    }
}

//! Shared application state handed to every handler.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::gateway::{PaymentGateway, RazorpayClient, StripeClient};
use crate::store::TransactionStore;

/// Hex-encoded SHA-256 of an API key.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TransactionStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub razorpay: Option<Arc<RazorpayClient>>,
    pub stripe: Option<Arc<StripeClient>>,

    /// Publishable Stripe key served to the browser
    pub stripe_publishable_key: Option<String>,

    /// Base URL the payer is redirected to after a payment
    pub frontend_url: String,

    /// Digest of the admin key; `None` locks the privileged routes
    pub admin_key_hash: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            razorpay: None,
            stripe: None,
            stripe_publishable_key: None,
            frontend_url: frontend_url.into(),
            admin_key_hash: None,
        }
    }

    pub fn with_razorpay(mut self, client: Arc<RazorpayClient>) -> Self {
        self.razorpay = Some(client);
        self
    }

    pub fn with_stripe(mut self, client: Arc<StripeClient>) -> Self {
        self.stripe = Some(client);
        self
    }

    pub fn with_stripe_publishable_key(mut self, key: impl Into<String>) -> Self {
        self.stripe_publishable_key = Some(key.into());
        self
    }

    pub fn with_admin_key(mut self, key: &str) -> Self {
        self.admin_key_hash = Some(hash_api_key(key));
        self
    }
}

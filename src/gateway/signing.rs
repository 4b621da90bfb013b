//! PhonePe request signing.
//!
//! The `X-VERIFY` header is `HEX(SHA256(base64Payload + path + saltKey)) + "###" + keyIndex`.
//! Status queries sign `path + saltKey` with no payload. This must stay
//! bit-exact or the provider rejects the request.

use base64::{Engine as _, engine::general_purpose::STANDARD as base64};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Path signed for pay requests.
pub const PAY_PATH: &str = "/pg/v1/pay";

/// Path signed for a status query.
pub fn status_path(merchant_id: &str, merchant_transaction_id: &str) -> String {
    format!("/pg/v1/status/{merchant_id}/{merchant_transaction_id}")
}

/// Serialize `payload` to JSON and Base64-encode it.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(payload)?;
    Ok(base64.encode(json))
}

/// Compute the `X-VERIFY` value for a pay request.
pub fn sign_request(base64_payload: &str, path: &str, salt_key: &str, key_index: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base64_payload.as_bytes());
    hasher.update(path.as_bytes());
    hasher.update(salt_key.as_bytes());

    format!("{}###{}", hex::encode(hasher.finalize()), key_index)
}

/// Compute the `X-VERIFY` value for a status query.
pub fn sign_status(path: &str, salt_key: &str, key_index: &str) -> String {
    sign_request("", path, salt_key, key_index)
}

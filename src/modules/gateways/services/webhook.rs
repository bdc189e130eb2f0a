// PhonePe server-to-server callback handling
//
// PhonePe sends `Authorization: SHA256(username:password)` using the
// credentials configured on its dashboard, and a JSON body wrapping the
// order in `payload`.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::phonepe::{settled_transaction_id, PaymentDetail};
use crate::core::{AppError, Paise, Result};
use crate::modules::gateways::models::ChargeState;

/// Expected `Authorization` header value for the configured credentials
pub fn expected_authorization(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", username, password).as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a callback's `Authorization` header
///
/// Accepts the bare hex digest or one prefixed with `SHA256 `; comparison is
/// case-insensitive and does not short-circuit.
pub fn verify_authorization(header: &str, username: &str, password: &str) -> bool {
    let provided = header.trim();
    let provided = provided
        .strip_prefix("SHA256 ")
        .or_else(|| provided.strip_prefix("sha256 "))
        .unwrap_or(provided)
        .trim()
        .to_ascii_lowercase();
    let expected = expected_authorization(username, password);

    provided.len() == expected.len()
        && provided
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[derive(Deserialize)]
struct WebhookEnvelope {
    event: String,
    payload: WebhookOrder,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookOrder {
    merchant_order_id: String,
    state: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    payment_details: Vec<PaymentDetail>,
}

/// Order update carried by a PhonePe callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookNotification {
    pub event: String,
    pub merchant_order_id: String,
    pub state: ChargeState,
    pub amount: Paise,
    pub gateway_transaction_id: Option<String>,
}

/// Parse a PhonePe callback body
pub fn parse_notification(body: &str) -> Result<WebhookNotification> {
    let envelope: WebhookEnvelope = serde_json::from_str(body)
        .map_err(|e| AppError::validation(format!("Invalid webhook payload: {}", e)))?;

    if envelope.payload.merchant_order_id.trim().is_empty() {
        return Err(AppError::validation("Webhook payload has no merchantOrderId"));
    }

    Ok(WebhookNotification {
        event: envelope.event,
        gateway_transaction_id: settled_transaction_id(&envelope.payload.payment_details),
        merchant_order_id: envelope.payload.merchant_order_id,
        state: ChargeState::from_gateway(&envelope.payload.state),
        amount: Paise::new(envelope.payload.amount),
    })
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{AppError, Paise, Result};

/// One attempt to collect an installment through the gateway
///
/// Keyed by `merchant_order_id`, which is also the gateway transaction id
/// recorded in the ledger once the payment settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAttempt {
    pub merchant_order_id: String,
    pub user_id: String,
    pub course_id: String,
    pub plan_transaction_id: String,
    /// 1-based installment this attempt pays
    pub installment_number: u32,
    pub amount_minor: Paise,
    /// Random value echoed back on the callback URL
    pub session_token: String,
    pub gateway_order_id: Option<String>,
    pub redirect_url: Option<String>,
    pub status: AttemptStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attempt status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Sent to the gateway, outcome unknown
    Initiated,
    /// Settled and recorded in the ledger
    Confirmed,
    Failed,
    /// Never resolved before `expires_at`
    Expired,
    /// Settled after its installment was already paid; needs a refund
    Surplus,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Surplus => "surplus",
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for AttemptStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "initiated" => Ok(Self::Initiated),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            "surplus" => Ok(Self::Surplus),
            _ => Err(format!("Invalid attempt status: {}", value)),
        }
    }
}

impl PaymentAttempt {
    /// Create a new attempt with a fresh merchant order id and session token
    ///
    /// # Arguments
    /// * `installment_number` - 1-based installment being paid
    /// * `amount_minor` - Amount to charge, in paise
    /// * `ttl` - How long the attempt may stay unresolved
    pub fn new(
        user_id: String,
        course_id: String,
        plan_transaction_id: String,
        installment_number: u32,
        amount_minor: Paise,
        ttl: Duration,
    ) -> Result<Self> {
        if amount_minor.value() <= 0 {
            return Err(AppError::validation("Attempt amount must be positive"));
        }
        if installment_number == 0 {
            return Err(AppError::validation("Installment number is 1-based"));
        }

        let now = Utc::now();

        Ok(Self {
            merchant_order_id: format!("EMI{}", Uuid::new_v4().simple()),
            user_id,
            course_id,
            plan_transaction_id,
            installment_number,
            amount_minor,
            session_token: Uuid::new_v4().simple().to_string(),
            gateway_order_id: None,
            redirect_url: None,
            status: AttemptStatus::Initiated,
            created_at: now,
            expires_at: now + ttl,
            updated_at: now,
        })
    }

    /// Initiated, not yet expired and holding a checkout to send the user to
    pub fn is_reusable(&self, now: DateTime<Utc>) -> bool {
        self.status == AttemptStatus::Initiated && now < self.expires_at && self.redirect_url.is_some()
    }

    /// Key shared by every attempt at the same installment; at most one
    /// initiated attempt may hold it
    pub fn live_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.user_id, self.plan_transaction_id, self.installment_number
        )
    }

    /// Whether the identifiers on a callback URL belong to this attempt
    pub fn matches_callback(&self, course_id: &str, original_txn: &str, session_token: &str) -> bool {
        self.course_id == course_id
            && self.plan_transaction_id == original_txn
            && tokens_equal(&self.session_token, session_token)
    }
}

fn tokens_equal(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

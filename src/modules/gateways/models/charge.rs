use serde::{Deserialize, Serialize};

use crate::core::Paise;

/// Context attached to a charge so it can be traced back from the gateway dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargeMetadata {
    pub user_id: String,
    pub course_id: String,
    pub plan_transaction_id: String,
    pub installment_number: u32,
}

/// A hosted checkout session created at the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeSession {
    pub gateway_order_id: String,
    pub redirect_url: String,
}

/// Settlement state reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChargeState {
    Completed,
    Failed,
    Pending,
}

impl ChargeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Pending => "PENDING",
        }
    }

    /// Map a gateway state string; anything unrecognised is treated as pending
    pub fn from_gateway(state: &str) -> Self {
        match state.trim().to_ascii_uppercase().as_str() {
            "COMPLETED" | "SUCCESS" | "PAYMENT_SUCCESS" => Self::Completed,
            "FAILED" | "PAYMENT_ERROR" | "PAYMENT_DECLINED" | "EXPIRED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for ChargeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a status lookup for one merchant order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeStatus {
    pub state: ChargeState,
    pub amount: Paise,
    /// Gateway's own id of the settled transaction, when reported
    pub gateway_transaction_id: Option<String>,
}

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{AppError, Result};

/// Number of decimal places carried by rupee amounts
pub const RUPEE_SCALE: u32 = 2;

const PAISE_PER_RUPEE: i64 = 100;

/// Rounds a rupee amount to paise using half-up rounding
///
/// Internal computations keep full precision; this is applied only when a
/// value is stored or displayed.
pub fn round_rupees(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(RUPEE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Formats a rupee amount for display
pub fn format_rupees(amount: Decimal) -> String {
    format!("INR {:.2}", round_rupees(amount))
}

/// Amount in the smallest currency unit (paise)
///
/// Gateway traffic is denominated in `Paise`; business logic works in rupee
/// `Decimal`s. `from_rupees` and `to_rupees` are the only conversions between
/// the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Paise(i64);

impl Paise {
    pub const ZERO: Paise = Paise(0);

    pub fn new(value: i64) -> Self {
        Paise(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Convert a rupee amount into paise
    ///
    /// Rejects negative amounts and amounts with sub-paise precision.
    pub fn from_rupees(amount: Decimal) -> Result<Self> {
        if amount < Decimal::ZERO {
            return Err(AppError::validation(format!(
                "Amount cannot be negative: {}",
                amount
            )));
        }

        let normalized = amount.normalize();
        if normalized.scale() > RUPEE_SCALE {
            return Err(AppError::validation(format!(
                "Rupee amounts must have at most {} decimal places, got {}",
                RUPEE_SCALE, amount
            )));
        }

        let minor = normalized * Decimal::from(PAISE_PER_RUPEE);
        let value = i64::try_from(minor)
            .map_err(|_| AppError::validation(format!("Amount out of range: {}", amount)))?;

        Ok(Paise(value))
    }

    /// Convert paise back into rupees
    pub fn to_rupees(&self) -> Decimal {
        Decimal::new(self.0, RUPEE_SCALE)
    }
}

impl fmt::Display for Paise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} paise", self.0)
    }
}

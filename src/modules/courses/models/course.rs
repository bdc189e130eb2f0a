use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Result};

/// Maximum installment count for any EMI option
pub const MAX_EMI_MONTHS: u32 = 24;

/// A purchasable course with its EMI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub base_price: Decimal,
    pub discounted_price: Option<Decimal>,
    pub emi_enabled: bool,
    /// Courses priced below this amount are not sold on EMI
    pub emi_minimum_amount: Decimal,
    pub emi_options: Vec<EmiOption>,
}

impl Course {
    /// Price the EMI plan is computed from
    pub fn emi_price(&self) -> Decimal {
        match self.discounted_price {
            Some(price) if price > Decimal::ZERO => price,
            _ => self.base_price,
        }
    }

    pub fn find_option_by_months(&self, months: u32) -> Option<&EmiOption> {
        self.emi_options.iter().find(|o| o.months() == months)
    }
}

/// EMI option after normalization at the storage boundary
///
/// Two shapes exist in stored data: a legacy option carrying a single
/// `monthlyAmount` (the resolver derives the split itself) and an option with
/// an explicit `monthlyAmounts` schedule, which is used verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmiOption {
    Uniform {
        months: u32,
        monthly_amount: Decimal,
        processing_fee: Decimal,
    },
    Scheduled {
        months: u32,
        monthly_amounts: Vec<Decimal>,
        processing_fee: Decimal,
    },
}

impl EmiOption {
    pub fn months(&self) -> u32 {
        match self {
            EmiOption::Uniform { months, .. } | EmiOption::Scheduled { months, .. } => *months,
        }
    }

    pub fn processing_fee(&self) -> Decimal {
        match self {
            EmiOption::Uniform { processing_fee, .. }
            | EmiOption::Scheduled { processing_fee, .. } => *processing_fee,
        }
    }

    /// Per-month amounts fixed by the option, if any
    pub fn explicit_amounts(&self) -> Option<&[Decimal]> {
        match self {
            EmiOption::Uniform { .. } => None,
            EmiOption::Scheduled { monthly_amounts, .. } => Some(monthly_amounts),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let months = self.months();
        if months == 0 || months > MAX_EMI_MONTHS {
            return Err(AppError::validation(format!(
                "EMI months must be between 1 and {}, got {}",
                MAX_EMI_MONTHS, months
            )));
        }

        if self.processing_fee() < Decimal::ZERO {
            return Err(AppError::validation("Processing fee cannot be negative"));
        }

        if let Some(amounts) = self.explicit_amounts() {
            if amounts.len() != months as usize {
                return Err(AppError::validation(format!(
                    "monthlyAmounts has {} entries but option is for {} months",
                    amounts.len(),
                    months
                )));
            }
            if amounts.iter().any(|a| *a <= Decimal::ZERO) {
                return Err(AppError::validation(
                    "Every monthly amount must be positive",
                ));
            }
        }

        Ok(())
    }
}

/// EMI option as persisted (camelCase JSON, either historical shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEmiOption {
    pub months: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_amounts: Option<Vec<Decimal>>,
    #[serde(default)]
    pub processing_fee: Option<Decimal>,
}

impl TryFrom<StoredEmiOption> for EmiOption {
    type Error = AppError;

    fn try_from(stored: StoredEmiOption) -> Result<Self> {
        let processing_fee = stored.processing_fee.unwrap_or(Decimal::ZERO);

        let option = match stored.monthly_amounts {
            Some(monthly_amounts) if !monthly_amounts.is_empty() => EmiOption::Scheduled {
                months: stored.months,
                monthly_amounts,
                processing_fee,
            },
            _ => EmiOption::Uniform {
                months: stored.months,
                monthly_amount: stored.monthly_amount.unwrap_or(Decimal::ZERO),
                processing_fee,
            },
        };

        option.validate()?;
        Ok(option)
    }
}

impl From<&EmiOption> for StoredEmiOption {
    fn from(option: &EmiOption) -> Self {
        match option {
            EmiOption::Uniform {
                months,
                monthly_amount,
                processing_fee,
            } => StoredEmiOption {
                months: *months,
                monthly_amount: Some(*monthly_amount),
                monthly_amounts: None,
                processing_fee: Some(*processing_fee),
            },
            EmiOption::Scheduled {
                months,
                monthly_amounts,
                processing_fee,
            } => StoredEmiOption {
                months: *months,
                monthly_amount: None,
                monthly_amounts: Some(monthly_amounts.clone()),
                processing_fee: Some(*processing_fee),
            },
        }
    }
}

/// Parse the stored JSON list of EMI options into normalized options
pub fn parse_emi_options(json: &str) -> Result<Vec<EmiOption>> {
    let stored: Vec<StoredEmiOption> = serde_json::from_str(json)?;
    stored.into_iter().map(EmiOption::try_from).collect()
}

/// Serialize normalized options into the current stored shape
pub fn encode_emi_options(options: &[EmiOption]) -> Result<String> {
    let stored: Vec<StoredEmiOption> = options.iter().map(StoredEmiOption::from).collect();
    Ok(serde_json::to_string(&stored)?)
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Result};
use crate::modules::courses::models::MAX_EMI_MONTHS;

/// Concrete installment plan for one purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmiPlan {
    pub months: u32,
    pub per_month_amounts: Vec<Decimal>,
    pub processing_fee: Decimal,
    pub total_payable: Decimal,
}

impl EmiPlan {
    /// Build a plan from resolved amounts, computing the total
    pub fn new(per_month_amounts: Vec<Decimal>, processing_fee: Decimal) -> Result<Self> {
        let months = u32::try_from(per_month_amounts.len())
            .map_err(|_| AppError::validation("Too many installments"))?;

        if months == 0 || months > MAX_EMI_MONTHS {
            return Err(AppError::validation(format!(
                "EMI months must be between 1 and {}, got {}",
                MAX_EMI_MONTHS, months
            )));
        }

        let total_payable = per_month_amounts.iter().copied().sum::<Decimal>() + processing_fee;

        Ok(Self {
            months,
            per_month_amounts,
            processing_fee,
            total_payable,
        })
    }

    /// Sum of the installments, excluding the processing fee
    pub fn installments_total(&self) -> Decimal {
        self.total_payable - self.processing_fee
    }
}

/// Which EMI option of a course to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanSelection {
    /// Index into the course's configured options
    OptionIndex(usize),
    /// Installment count; uses the matching option if one is configured
    Months(u32),
}

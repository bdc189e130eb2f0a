use rust_decimal::Decimal;
use tracing::debug;

use crate::core::currency::round_rupees;
use crate::core::{AppError, Result};
use crate::modules::taxes::models::{HomeState, TaxBreakdown};

/// Splits tax-inclusive amounts into GST components
pub struct TaxCalculator {
    rate: Decimal,
    home_state: HomeState,
}

impl TaxCalculator {
    pub fn new(rate: Decimal, home_state: HomeState) -> Result<Self> {
        validate_tax_rate(rate)?;
        Ok(Self { rate, home_state })
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn is_home_state(&self, state: &str) -> bool {
        self.home_state.matches(state)
    }

    /// Split an amount for a buyer located in `state`
    pub fn split_for_state(&self, amount_inclusive: Decimal, state: &str) -> Result<TaxBreakdown> {
        split_tax(amount_inclusive, self.rate, self.is_home_state(state))
    }
}

/// Split a tax-inclusive amount into base and GST components
///
/// `base = amount / (1 + rate)`. In the home state the tax is CGST + SGST,
/// each `base * rate / 2`; elsewhere it is all IGST. Components are rounded to
/// paise half-up and the base absorbs the rounding so that
/// `cgst + sgst + igst == tax_amount` and `tax_amount + base_amount == amount`
/// hold exactly.
pub fn split_tax(
    amount_inclusive: Decimal,
    tax_rate: Decimal,
    is_home_state: bool,
) -> Result<TaxBreakdown> {
    validate_tax_rate(tax_rate)?;

    if amount_inclusive < Decimal::ZERO {
        return Err(AppError::validation("Taxable amount cannot be negative"));
    }

    let amount = round_rupees(amount_inclusive);
    let exact_base = amount / (Decimal::ONE + tax_rate);

    let breakdown = if is_home_state {
        let half = round_rupees(exact_base * tax_rate / Decimal::TWO);
        let tax_amount = half + half;
        TaxBreakdown {
            cgst: half,
            sgst: half,
            igst: Decimal::ZERO,
            tax_amount,
            base_amount: amount - tax_amount,
        }
    } else {
        let base_amount = round_rupees(exact_base);
        let igst = amount - base_amount;
        TaxBreakdown {
            cgst: Decimal::ZERO,
            sgst: Decimal::ZERO,
            igst,
            tax_amount: igst,
            base_amount,
        }
    };

    debug!(
        amount = %amount,
        rate = %tax_rate,
        is_home_state,
        tax_amount = %breakdown.tax_amount,
        "Split tax-inclusive amount"
    );

    Ok(breakdown)
}

/// Tax rate must be a fraction in 0..=1 with at most 4 decimal places
pub fn validate_tax_rate(tax_rate: Decimal) -> Result<()> {
    if tax_rate < Decimal::ZERO {
        return Err(AppError::validation("Tax rate cannot be negative"));
    }

    if tax_rate > Decimal::ONE {
        return Err(AppError::validation("Tax rate cannot exceed 1.0 (100%)"));
    }

    if tax_rate.normalize().scale() > 4 {
        return Err(AppError::validation(
            "Tax rate cannot have more than 4 decimal places",
        ));
    }

    Ok(())
}

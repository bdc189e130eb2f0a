use chrono::NaiveDate;

use crate::core::{AppError, Result};
use crate::modules::invoices::models::FiscalYear;

/// Digits of the zero-padded sequence part of an invoice number
pub const SEQUENCE_WIDTH: usize = 5;

/// Build an invoice number: `{prefix}-{fiscal_year_start}-{count_in_period + 1}`
///
/// The fiscal year start is written as `YYYY-MM-DD` and the sequence is
/// zero-padded to five digits ("ON-2025-04-01-00001"). Counts past 99999
/// simply widen the number.
///
/// # Errors
/// * `Validation` - empty prefix, or the range is not a single April 1 fiscal year
pub fn generate_invoice_sequence(
    channel_prefix: &str,
    fiscal_year_start: NaiveDate,
    fiscal_year_end: NaiveDate,
    count_in_period: u64,
) -> Result<String> {
    let prefix = channel_prefix.trim();
    if prefix.is_empty() {
        return Err(AppError::validation("Invoice prefix cannot be empty"));
    }

    FiscalYear::from_range(fiscal_year_start, fiscal_year_end)?;

    let next = count_in_period
        .checked_add(1)
        .ok_or_else(|| AppError::validation("Invoice count overflow"))?;

    Ok(format!(
        "{}-{}-{:0width$}",
        prefix,
        fiscal_year_start.format("%Y-%m-%d"),
        next,
        width = SEQUENCE_WIDTH
    ))
}

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::core::currency::format_rupees;
use crate::core::{AppError, Result};
use crate::modules::courses::models::{Course, EmiOption, MAX_EMI_MONTHS};
use crate::modules::plans::models::{EmiPlan, PlanSelection};

/// Resolves a course and a selection into a concrete EMI plan
pub struct PlanResolver;

impl PlanResolver {
    /// Resolve the EMI plan for a course
    ///
    /// Eligibility is checked before anything else so the caller can surface
    /// the unmet condition at plan-selection time.
    ///
    /// # Errors
    /// * `IneligibleForEmi` - EMI disabled for the course, or price below the EMI minimum
    /// * `Validation` - month count out of range, option index out of range, malformed option
    pub fn resolve(course: &Course, selection: PlanSelection) -> Result<EmiPlan> {
        Self::check_eligibility(course)?;

        let (option, months) = Self::select_option(course, selection)?;

        if months == 0 || months > MAX_EMI_MONTHS {
            return Err(AppError::validation(format!(
                "EMI months must be between 1 and {}, got {}",
                MAX_EMI_MONTHS, months
            )));
        }

        let price = course.emi_price();

        let per_month_amounts = match option.and_then(EmiOption::explicit_amounts) {
            Some(amounts) => {
                if amounts.len() != months as usize {
                    return Err(AppError::validation(format!(
                        "monthlyAmounts has {} entries but option is for {} months",
                        amounts.len(),
                        months
                    )));
                }
                let scheduled: Decimal = amounts.iter().copied().sum();
                if (scheduled - price).abs() > Decimal::from(months) {
                    warn!(
                        course_id = course.id.as_str(),
                        scheduled = %scheduled,
                        price = %price,
                        "Scheduled EMI amounts do not reconcile with course price"
                    );
                }
                amounts.to_vec()
            }
            None => Self::split_evenly(price, months)?,
        };

        let processing_fee = option.map(EmiOption::processing_fee).unwrap_or(Decimal::ZERO);
        let plan = EmiPlan::new(per_month_amounts, processing_fee)?;

        info!(
            course_id = course.id.as_str(),
            months = plan.months,
            total_payable = %plan.total_payable,
            "Resolved EMI plan"
        );

        Ok(plan)
    }

    fn check_eligibility(course: &Course) -> Result<()> {
        if !course.emi_enabled {
            return Err(AppError::ineligible(format!(
                "EMI is disabled for course '{}'",
                course.title
            )));
        }

        let price = course.emi_price();
        if price < course.emi_minimum_amount {
            return Err(AppError::ineligible(format!(
                "Course price {} is below the EMI minimum amount {}",
                format_rupees(price),
                format_rupees(course.emi_minimum_amount)
            )));
        }

        Ok(())
    }

    /// Pick the configured option (if any) and the installment count
    fn select_option(
        course: &Course,
        selection: PlanSelection,
    ) -> Result<(Option<&EmiOption>, u32)> {
        match selection {
            PlanSelection::OptionIndex(index) => {
                let option = course.emi_options.get(index).ok_or_else(|| {
                    AppError::validation(format!(
                        "EMI option {} does not exist (course has {})",
                        index,
                        course.emi_options.len()
                    ))
                })?;
                Ok((Some(option), option.months()))
            }
            PlanSelection::Months(months) => Ok((course.find_option_by_months(months), months)),
        }
    }

    /// Split `total` into `months` whole-rupee installments
    ///
    /// Every installment but the last is `ceil(total / months)`; the last takes
    /// `total - sum(others)` so the plan never under-collects.
    pub fn split_evenly(total: Decimal, months: u32) -> Result<Vec<Decimal>> {
        if months == 0 {
            return Err(AppError::validation("Installment count cannot be zero"));
        }
        if total <= Decimal::ZERO {
            return Err(AppError::validation("EMI price must be positive"));
        }

        let count = months as usize;
        let installment = (total / Decimal::from(months)).ceil();
        let last = total - installment * Decimal::from(months - 1);

        if last <= Decimal::ZERO {
            return Err(AppError::validation(format!(
                "{} cannot be split into {} positive installments",
                format_rupees(total),
                months
            )));
        }

        let mut amounts = vec![installment; count - 1];
        amounts.push(last);
        Ok(amounts)
    }
}

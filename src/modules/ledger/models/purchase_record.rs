use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::timezone::add_months;
use crate::core::{AppError, Result};
use crate::modules::courses::models::Course;
use crate::modules::plans::models::EmiPlan;

/// One entry of a user's purchase history
///
/// A plan-opening record (`transaction_id == plan_transaction_id`) carries
/// the live plan state: `months_left` and `next_emi_due_date` change in place
/// as installments are paid. Every paid installment is appended as its own
/// immutable record with `months_left = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub course_title: String,
    /// Rupees paid in this transaction
    pub amount: Decimal,
    pub transaction_id: String,
    pub plan_transaction_id: String,
    pub purchased_at: DateTime<Utc>,
    pub promo_code: Option<String>,
    pub is_emi: bool,
    pub total_emi_months: u32,
    pub months_left: u32,
    pub emi_amount: Decimal,
    pub next_emi_due_date: Option<DateTime<Utc>>,
    /// The plan's own copy of its per-month amounts
    pub installment_amounts: Vec<Decimal>,
    pub processing_fee: Decimal,
}

/// Lifecycle state of an EMI plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Overdue,
    Completed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Overdue => "overdue",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A confirmed installment payment to apply to a plan
#[derive(Debug, Clone)]
pub struct InstallmentPayment {
    pub user_id: String,
    pub course_id: String,
    pub plan_transaction_id: String,
    /// Rupees received for this installment
    pub amount: Decimal,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
    /// Installment the payment was charged for; `None` applies it to the current one
    pub installment_number: Option<u32>,
}

/// Result of applying an installment: the updated plan record and the
/// record appended for the payment itself
#[derive(Debug, Clone)]
pub struct InstallmentApplied {
    pub plan: PurchaseRecord,
    pub installment: PurchaseRecord,
}

impl PurchaseRecord {
    /// Build the record that opens an EMI plan
    ///
    /// The opening transaction carries the processing fee; installments are
    /// paid afterwards, the first one due a month from `now`.
    pub fn open_plan(
        user_id: String,
        course: &Course,
        plan: &EmiPlan,
        initial_transaction_id: String,
        promo_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if initial_transaction_id.trim().is_empty() {
            return Err(AppError::validation("Initial transaction id is required"));
        }

        let emi_amount = *plan
            .per_month_amounts
            .first()
            .ok_or_else(|| AppError::validation("EMI plan has no installments"))?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            course_id: course.id.clone(),
            course_title: course.title.clone(),
            amount: plan.processing_fee,
            transaction_id: initial_transaction_id.clone(),
            plan_transaction_id: initial_transaction_id,
            purchased_at: now,
            promo_code,
            is_emi: true,
            total_emi_months: plan.months,
            months_left: plan.months,
            emi_amount,
            next_emi_due_date: Some(add_months(now, 1)?),
            installment_amounts: plan.per_month_amounts.clone(),
            processing_fee: plan.processing_fee,
        })
    }

    pub fn is_plan_record(&self) -> bool {
        self.is_emi && self.transaction_id == self.plan_transaction_id
    }

    pub fn is_active(&self) -> bool {
        self.is_plan_record() && self.months_left > 0
    }

    pub fn status(&self, now: DateTime<Utc>) -> PlanStatus {
        if self.months_left == 0 {
            return PlanStatus::Completed;
        }
        match self.next_emi_due_date {
            Some(due) if now > due => PlanStatus::Overdue,
            _ => PlanStatus::Active,
        }
    }

    /// 1-based number of the next installment to be paid
    pub fn current_installment_number(&self) -> u32 {
        self.total_emi_months - self.months_left + 1
    }

    /// Scheduled amount of the next installment
    pub fn current_installment_amount(&self) -> Result<Decimal> {
        if self.months_left == 0 {
            return Err(AppError::plan_not_found(format!(
                "Plan {} is already fully paid",
                self.plan_transaction_id
            )));
        }
        let index = (self.total_emi_months - self.months_left) as usize;
        self.installment_amounts.get(index).copied().ok_or_else(|| {
            AppError::internal(format!(
                "Plan {} has no amount for installment {}",
                self.plan_transaction_id,
                index + 1
            ))
        })
    }

    /// Maximum that may ever be collected against this plan
    pub fn total_payable(&self) -> Decimal {
        self.installment_amounts.iter().copied().sum::<Decimal>() + self.processing_fee
    }

    /// Whether the next installment falls due within `within` of `now`
    pub fn is_due_within(&self, now: DateTime<Utc>, within: Duration) -> bool {
        self.is_active()
            && self
                .next_emi_due_date
                .map(|due| due <= now + within)
                .unwrap_or(false)
    }

    /// Apply one paid installment to this plan record
    ///
    /// `paid_so_far` is the sum of `amount` over every record of the plan,
    /// this one included. Returns the updated plan record and the new
    /// installment record; `self` is left untouched so callers can discard
    /// both on a failed write.
    pub fn apply_installment(
        &self,
        payment: &InstallmentPayment,
        paid_so_far: Decimal,
    ) -> Result<InstallmentApplied> {
        if !self.is_active() {
            return Err(AppError::plan_not_found(format!(
                "No active EMI plan for transaction {}",
                payment.plan_transaction_id
            )));
        }

        if payment.amount <= Decimal::ZERO {
            return Err(AppError::validation("Installment amount must be positive"));
        }

        let current = self.current_installment_number();
        if let Some(number) = payment.installment_number {
            if number != current {
                return Err(AppError::InstallmentSuperseded(format!(
                    "Payment {} was charged for installment {} but plan {} is on installment {}",
                    payment.transaction_id, number, self.plan_transaction_id, current
                )));
            }
        }

        let total_payable = self.total_payable();
        if paid_so_far + payment.amount > total_payable {
            return Err(AppError::validation(format!(
                "Payment of {} would exceed plan total {} (already paid {})",
                payment.amount, total_payable, paid_so_far
            )));
        }

        let scheduled = self.current_installment_amount()?;
        if payment.amount != scheduled {
            return Err(AppError::validation(format!(
                "Payment of {} does not match installment {} of {}",
                payment.amount, current, scheduled
            )));
        }

        let months_left = self.months_left - 1;

        let mut plan = self.clone();
        plan.months_left = months_left;
        plan.next_emi_due_date = if months_left > 0 {
            Some(add_months(payment.paid_at, 1)?)
        } else {
            None
        };

        let installment = PurchaseRecord {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            course_id: self.course_id.clone(),
            course_title: self.course_title.clone(),
            amount: payment.amount,
            transaction_id: payment.transaction_id.clone(),
            plan_transaction_id: self.plan_transaction_id.clone(),
            purchased_at: payment.paid_at,
            promo_code: None,
            is_emi: true,
            total_emi_months: self.total_emi_months,
            months_left: 0,
            emi_amount: scheduled,
            next_emi_due_date: None,
            installment_amounts: Vec::new(),
            processing_fee: Decimal::ZERO,
        };

        Ok(InstallmentApplied { plan, installment })
    }
}

/// Pending-installment view of an active plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuePlan {
    pub course_id: String,
    pub course_name: String,
    pub months_left: u32,
    pub emi_amount: Decimal,
    pub next_due_date: Option<DateTime<Utc>>,
    #[serde(rename = "totalEMIMonths")]
    pub total_emi_months: u32,
    pub original_transaction_id: String,
    pub status: PlanStatus,
}

impl DuePlan {
    pub fn from_record(record: &PurchaseRecord, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            course_id: record.course_id.clone(),
            course_name: record.course_title.clone(),
            months_left: record.months_left,
            emi_amount: record.current_installment_amount()?,
            next_due_date: record.next_emi_due_date,
            total_emi_months: record.total_emi_months,
            original_transaction_id: record.plan_transaction_id.clone(),
            status: record.status(now),
        })
    }
}

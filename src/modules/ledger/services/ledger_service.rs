use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::{AppError, Paise, Result};
use crate::modules::courses::models::Course;
use crate::modules::ledger::models::{DuePlan, InstallmentPayment, PurchaseRecord};
use crate::modules::ledger::repositories::LedgerRepository;
use crate::modules::plans::models::EmiPlan;

/// All records of one plan together with the amount collected so far
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanHistory {
    pub plan_transaction_id: String,
    pub records: Vec<PurchaseRecord>,
    pub total_paid: Decimal,
}

/// Installment ledger operations
pub struct LedgerService {
    repository: Arc<dyn LedgerRepository>,
}

impl LedgerService {
    pub fn new(repository: Arc<dyn LedgerRepository>) -> Self {
        Self { repository }
    }

    /// Open an EMI plan for a user
    ///
    /// # Arguments
    /// * `user_id` - Opaque user key
    /// * `course` - Course being purchased (title is snapshotted)
    /// * `plan` - Plan produced by the resolver
    /// * `initial_transaction_id` - Gateway transaction that paid the processing fee
    ///
    /// # Errors
    /// * `DuplicateActivePlan` - the user already has an active plan for this course
    pub async fn open_plan(
        &self,
        user_id: &str,
        course: &Course,
        plan: &EmiPlan,
        initial_transaction_id: &str,
        promo_code: Option<String>,
    ) -> Result<PurchaseRecord> {
        let record = PurchaseRecord::open_plan(
            user_id.to_string(),
            course,
            plan,
            initial_transaction_id.to_string(),
            promo_code,
            Utc::now(),
        )?;

        self.repository.append_plan_record(&record).await?;

        info!(
            user_id = user_id,
            course_id = course.id.as_str(),
            plan_transaction_id = initial_transaction_id,
            months = plan.months,
            total_payable = %plan.total_payable,
            "Opened EMI plan"
        );

        Ok(record)
    }

    /// Record one paid installment against an active plan
    ///
    /// Returns the updated plan-opening record.
    pub async fn record_installment_paid(
        &self,
        user_id: &str,
        course_id: &str,
        original_transaction_id: &str,
        amount_paid: Paise,
        new_gateway_transaction_id: &str,
    ) -> Result<PurchaseRecord> {
        self.record_payment(
            user_id,
            course_id,
            original_transaction_id,
            amount_paid,
            new_gateway_transaction_id,
            None,
        )
        .await
    }

    /// Record a payment that was charged for a specific installment
    ///
    /// Fails with `InstallmentSuperseded` when the plan has already moved
    /// past `installment_number`; the plan is left untouched.
    pub async fn record_scheduled_installment(
        &self,
        user_id: &str,
        course_id: &str,
        original_transaction_id: &str,
        installment_number: u32,
        amount_paid: Paise,
        new_gateway_transaction_id: &str,
    ) -> Result<PurchaseRecord> {
        self.record_payment(
            user_id,
            course_id,
            original_transaction_id,
            amount_paid,
            new_gateway_transaction_id,
            Some(installment_number),
        )
        .await
    }

    async fn record_payment(
        &self,
        user_id: &str,
        course_id: &str,
        original_transaction_id: &str,
        amount_paid: Paise,
        new_gateway_transaction_id: &str,
        installment_number: Option<u32>,
    ) -> Result<PurchaseRecord> {
        if new_gateway_transaction_id.trim().is_empty() {
            return Err(AppError::validation("Gateway transaction id is required"));
        }

        let payment = InstallmentPayment {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            plan_transaction_id: original_transaction_id.to_string(),
            amount: amount_paid.to_rupees(),
            transaction_id: new_gateway_transaction_id.to_string(),
            paid_at: Utc::now(),
            installment_number,
        };

        let applied = match self.repository.record_installment(&payment).await {
            Ok(applied) => applied,
            Err(e) => {
                warn!(
                    user_id = user_id,
                    course_id = course_id,
                    plan_transaction_id = original_transaction_id,
                    transaction_id = new_gateway_transaction_id,
                    error = %e,
                    "Installment not recorded"
                );
                return Err(e);
            }
        };

        info!(
            user_id = user_id,
            course_id = course_id,
            plan_transaction_id = original_transaction_id,
            transaction_id = new_gateway_transaction_id,
            amount = %payment.amount,
            months_left = applied.plan.months_left,
            "Recorded EMI installment"
        );

        Ok(applied.plan)
    }

    /// Whether a gateway transaction is stored against a plan
    ///
    /// A removed plan has no records, so nothing is reported as stored.
    pub async fn is_transaction_recorded(
        &self,
        user_id: &str,
        course_id: &str,
        original_transaction_id: &str,
        gateway_transaction_id: &str,
    ) -> Result<bool> {
        let records = self
            .repository
            .list_plan_records(user_id, course_id, original_transaction_id)
            .await?;
        Ok(records
            .iter()
            .any(|r| r.transaction_id == gateway_transaction_id))
    }

    /// Active plan lookup used before charging an installment
    pub async fn find_active_plan(
        &self,
        user_id: &str,
        course_id: &str,
        original_transaction_id: &str,
    ) -> Result<PurchaseRecord> {
        self.repository
            .find_active_plan(user_id, course_id, original_transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::plan_not_found(format!(
                    "No active EMI plan {} for course {}",
                    original_transaction_id, course_id
                ))
            })
    }

    /// Active plans with an installment due within `within_days`, overdue included
    pub async fn list_due_plans(&self, user_id: &str, within_days: u32) -> Result<Vec<DuePlan>> {
        let now = Utc::now();
        let window = Duration::days(i64::from(within_days));

        self.repository
            .list_active_plans(user_id)
            .await?
            .iter()
            .filter(|record| record.is_due_within(now, window))
            .map(|record| DuePlan::from_record(record, now))
            .collect()
    }

    /// Every active plan of the user, regardless of due date
    pub async fn list_pending_plans(&self, user_id: &str) -> Result<Vec<DuePlan>> {
        let now = Utc::now();

        self.repository
            .list_active_plans(user_id)
            .await?
            .iter()
            .map(|record| DuePlan::from_record(record, now))
            .collect()
    }

    pub async fn plan_history(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<PlanHistory> {
        let records = self
            .repository
            .list_plan_records(user_id, course_id, plan_transaction_id)
            .await?;

        if records.is_empty() {
            return Err(AppError::plan_not_found(format!(
                "No EMI plan {} for course {}",
                plan_transaction_id, course_id
            )));
        }

        let total_paid = records.iter().map(|r| r.amount).sum();

        Ok(PlanHistory {
            plan_transaction_id: plan_transaction_id.to_string(),
            records,
            total_paid,
        })
    }

    /// Admin removal of a plan and all of its installment records
    pub async fn remove_plan(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<u64> {
        let removed = self
            .repository
            .delete_plan(user_id, course_id, plan_transaction_id)
            .await?;

        if removed == 0 {
            return Err(AppError::plan_not_found(format!(
                "No EMI plan {} for course {}",
                plan_transaction_id, course_id
            )));
        }

        info!(
            user_id = user_id,
            course_id = course_id,
            plan_transaction_id = plan_transaction_id,
            removed = removed,
            "Removed EMI plan"
        );

        Ok(removed)
    }
}

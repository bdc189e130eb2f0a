use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::timezone::add_months_to_date;
use crate::core::{AppError, Result};
use crate::modules::courses::models::MAX_EMI_MONTHS;

/// One month of a cash installment schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineEmiStatus {
    Active,
    Completed,
}

impl OfflineEmiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OfflineEmiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for OfflineEmiStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid offline EMI status: {}", value)),
        }
    }
}

/// Installment plan for a student paying in cash at the centre
///
/// The counters and totals are derived from `emi_schedule` and are
/// recomputed on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineEmi {
    pub id: String,
    pub student_name: String,
    pub student_email: String,
    pub student_phone: String,
    pub course_name: String,
    pub total_amount: Decimal,
    pub monthly_emi_amount: Decimal,
    pub total_emis: u32,
    pub emis_paid_months: u32,
    pub emis_left: u32,
    pub total_emi_paid: Decimal,
    pub total_emi_due: Decimal,
    pub emi_schedule: Vec<ScheduleEntry>,
    pub status: OfflineEmiStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to register a cash installment plan
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfflineEmiRequest {
    pub student_name: String,
    pub student_email: String,
    #[serde(default)]
    pub student_phone: String,
    pub course_name: String,
    pub total_amount: Decimal,
    /// Defaults to the total split into whole-rupee months, rounded up
    pub monthly_emi_amount: Option<Decimal>,
    pub total_emis: u32,
    /// Date of the first installment
    pub start_date: NaiveDate,
}

impl OfflineEmi {
    /// Build a plan with a monthly schedule starting at `request.start_date`
    pub fn create(request: CreateOfflineEmiRequest, now: DateTime<Utc>) -> Result<Self> {
        for (field, value) in [
            ("studentName", &request.student_name),
            ("studentEmail", &request.student_email),
            ("courseName", &request.course_name),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::validation(format!("{} is required", field)));
            }
        }

        if request.total_emis == 0 || request.total_emis > MAX_EMI_MONTHS {
            return Err(AppError::validation(format!(
                "Total EMIs must be between 1 and {}, got {}",
                MAX_EMI_MONTHS, request.total_emis
            )));
        }

        if request.total_amount <= Decimal::ZERO {
            return Err(AppError::validation("Total amount must be positive"));
        }

        let monthly_emi_amount = match request.monthly_emi_amount {
            Some(amount) if amount <= Decimal::ZERO => {
                return Err(AppError::validation("Monthly EMI amount must be positive"));
            }
            Some(amount) => amount,
            None => (request.total_amount / Decimal::from(request.total_emis)).ceil(),
        };

        let emi_schedule = (0..request.total_emis)
            .map(|month| {
                Ok(ScheduleEntry {
                    date: add_months_to_date(request.start_date, month)?,
                    paid: false,
                    paid_at: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut emi = Self {
            id: Uuid::new_v4().to_string(),
            student_name: request.student_name.trim().to_string(),
            student_email: request.student_email.trim().to_string(),
            student_phone: request.student_phone.trim().to_string(),
            course_name: request.course_name.trim().to_string(),
            total_amount: request.total_amount,
            monthly_emi_amount,
            total_emis: request.total_emis,
            emis_paid_months: 0,
            emis_left: request.total_emis,
            total_emi_paid: Decimal::ZERO,
            total_emi_due: request.total_amount,
            emi_schedule,
            status: OfflineEmiStatus::Active,
            created_at: now,
            updated_at: now,
        };
        emi.recompute();

        Ok(emi)
    }

    /// Flip exactly one schedule entry from unpaid to paid
    ///
    /// # Errors
    /// * `Validation` - index out of range, or the entry is already paid
    pub fn mark_installment_paid(&mut self, index: usize, now: DateTime<Utc>) -> Result<()> {
        let entries = self.emi_schedule.len();
        let entry = self.emi_schedule.get_mut(index).ok_or_else(|| {
            AppError::validation(format!(
                "Schedule index {} out of range (plan has {} entries)",
                index, entries
            ))
        })?;

        if entry.paid {
            return Err(AppError::validation(format!(
                "Installment {} is already paid",
                index + 1
            )));
        }

        entry.paid = true;
        entry.paid_at = Some(now);
        self.updated_at = now;
        self.recompute();

        Ok(())
    }

    /// Re-derive counters, totals and status from the schedule
    pub fn recompute(&mut self) {
        let paid = self.emi_schedule.iter().filter(|e| e.paid).count() as u32;

        self.total_emis = self.emi_schedule.len() as u32;
        self.emis_paid_months = paid;
        self.emis_left = self.total_emis.saturating_sub(paid);
        self.total_emi_paid = self.monthly_emi_amount * Decimal::from(paid);
        self.total_emi_due = (self.total_amount - self.total_emi_paid).max(Decimal::ZERO);
        self.status = if self.emis_left == 0 {
            OfflineEmiStatus::Completed
        } else {
            OfflineEmiStatus::Active
        };
    }

    /// Next unpaid schedule date, if any
    pub fn next_due_date(&self) -> Option<NaiveDate> {
        self.emi_schedule.iter().find(|e| !e.paid).map(|e| e.date)
    }
}

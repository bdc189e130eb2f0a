// Tax invoice issued for a course payment
//
// Invoices are immutable once created. One invoice exists per
// (transaction_id, admission_form_id); its number is unique and sequential
// within a (channel, fiscal year).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Result};
use crate::modules::taxes::TaxBreakdown;

/// Sales channel the invoice was raised through; decides the number prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentChannel {
    Online,
    Offline,
}

impl PaymentChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    /// Prefix of invoice numbers issued through this channel
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Online => "ON",
            Self::Offline => "OFF",
        }
    }
}

impl std::fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for PaymentChannel {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            _ => Err(format!("Invalid payment channel: {}", value)),
        }
    }
}

/// Indian fiscal year, April 1 to March 31
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiscalYear {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FiscalYear {
    /// Fiscal year starting April 1 of `start_year`
    pub fn starting(start_year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(start_year, 4, 1)
            .ok_or_else(|| AppError::validation(format!("Invalid fiscal year {}", start_year)))?;
        let end = NaiveDate::from_ymd_opt(start_year + 1, 3, 31)
            .ok_or_else(|| AppError::validation(format!("Invalid fiscal year {}", start_year)))?;
        Ok(Self { start, end })
    }

    /// Fiscal year a calendar date falls in
    pub fn containing(date: NaiveDate) -> Result<Self> {
        let start_year = if date.month() >= 4 {
            date.year()
        } else {
            date.year() - 1
        };
        Self::starting(start_year)
    }

    /// Check that `start..=end` is exactly one fiscal year
    pub fn from_range(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let fiscal_year = Self::starting(start.year())?;
        if fiscal_year.start != start || fiscal_year.end != end {
            return Err(AppError::validation(format!(
                "{} to {} is not a fiscal year (April 1 to March 31)",
                start, end
            )));
        }
        Ok(fiscal_year)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Short label, e.g. "2025-26"
    pub fn label(&self) -> String {
        format!("{}-{:02}", self.start.year(), self.end.year() % 100)
    }
}

/// Issued invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub channel: PaymentChannel,
    pub transaction_id: String,
    pub admission_form_id: String,
    pub student_name: String,
    pub student_email: String,
    pub student_state: String,
    pub course_id: String,
    pub course_title: String,
    /// Tax-inclusive amount
    pub amount: Decimal,
    pub tax: TaxBreakdown,
    pub fiscal_year_start: NaiveDate,
    /// Position within (channel, fiscal year), 1-based
    pub sequence: u32,
    pub created_at: DateTime<Utc>,
}

/// Request to raise an invoice
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub channel: PaymentChannel,
    pub transaction_id: String,
    pub admission_form_id: String,
    pub student_name: String,
    pub student_email: String,
    /// Billing state; decides CGST + SGST versus IGST
    pub student_state: String,
    pub course_id: String,
    pub course_title: String,
    pub amount: Decimal,
}

impl CreateInvoiceRequest {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("transactionId", &self.transaction_id),
            ("admissionFormId", &self.admission_form_id),
            ("studentName", &self.student_name),
            ("studentState", &self.student_state),
            ("courseId", &self.course_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::validation(format!("{} is required", field)));
            }
        }

        if self.amount <= Decimal::ZERO {
            return Err(AppError::validation("Invoice amount must be positive"));
        }

        Ok(())
    }
}

/// Invoice contents before a number is allocated
#[derive(Debug, Clone)]
pub struct InvoiceDraft {
    pub channel: PaymentChannel,
    pub transaction_id: String,
    pub admission_form_id: String,
    pub student_name: String,
    pub student_email: String,
    pub student_state: String,
    pub course_id: String,
    pub course_title: String,
    pub amount: Decimal,
    pub tax: TaxBreakdown,
    pub fiscal_year: FiscalYear,
}

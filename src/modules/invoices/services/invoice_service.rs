use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::core::currency::round_rupees;
use crate::core::timezone::TimezoneConverter;
use crate::core::{AppError, Result};
use crate::modules::invoices::models::{CreateInvoiceRequest, FiscalYear, Invoice, InvoiceDraft};
use crate::modules::invoices::repositories::InvoiceRepository;
use crate::modules::taxes::TaxCalculator;

/// Attempts at allocating a number before giving up with `SequenceConflict`
const MAX_NUMBERING_ATTEMPTS: usize = 3;

/// Outcome of an invoice request
#[derive(Debug, Clone)]
pub struct IssuedInvoice {
    pub invoice: Invoice,
    /// False when the invoice already existed for this transaction and form
    pub created: bool,
}

/// Service for invoice business logic
pub struct InvoiceService {
    invoice_repo: Arc<dyn InvoiceRepository>,
    tax: TaxCalculator,
}

impl InvoiceService {
    pub fn new(invoice_repo: Arc<dyn InvoiceRepository>, tax: TaxCalculator) -> Self {
        Self { invoice_repo, tax }
    }

    /// Raise an invoice for a payment
    ///
    /// Idempotent on `(transaction_id, admission_form_id)`. The fiscal year is
    /// taken from today's date in India.
    ///
    /// # Errors
    /// * `Validation` - missing fields or non-positive amount
    /// * `SequenceConflict` - numbering kept colliding
    pub async fn create_invoice(&self, request: CreateInvoiceRequest) -> Result<IssuedInvoice> {
        request.validate()?;

        if let Some(existing) = self
            .invoice_repo
            .find_by_source(&request.transaction_id, &request.admission_form_id)
            .await?
        {
            return Ok(IssuedInvoice {
                invoice: existing,
                created: false,
            });
        }

        let amount = round_rupees(request.amount);
        let tax = self.tax.split_for_state(amount, &request.student_state)?;
        let fiscal_year = FiscalYear::containing(TimezoneConverter::ist_date(Utc::now()))?;

        let draft = InvoiceDraft {
            channel: request.channel,
            transaction_id: request.transaction_id,
            admission_form_id: request.admission_form_id,
            student_name: request.student_name,
            student_email: request.student_email,
            student_state: request.student_state,
            course_id: request.course_id,
            course_title: request.course_title,
            amount,
            tax,
            fiscal_year,
        };

        let mut last_conflict = None;
        for attempt in 1..=MAX_NUMBERING_ATTEMPTS {
            match self.invoice_repo.create_numbered(&draft).await {
                Ok((invoice, created)) => {
                    if created {
                        info!(
                            invoice_number = invoice.invoice_number.as_str(),
                            transaction_id = invoice.transaction_id.as_str(),
                            channel = %invoice.channel,
                            amount = %invoice.amount,
                            tax_amount = %invoice.tax.tax_amount,
                            "Issued invoice"
                        );
                    }
                    return Ok(IssuedInvoice { invoice, created });
                }
                Err(AppError::SequenceConflict(detail)) => {
                    warn!(attempt = attempt, detail = detail.as_str(), "Invoice number collision, retrying");
                    last_conflict = Some(detail);
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::SequenceConflict(format!(
            "Gave up after {} attempts: {}",
            MAX_NUMBERING_ATTEMPTS,
            last_conflict.unwrap_or_default()
        )))
    }

    pub async fn get_invoice(&self, invoice_number: &str) -> Result<Invoice> {
        self.invoice_repo
            .find_by_number(invoice_number)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Invoice {}", invoice_number)))
    }
}

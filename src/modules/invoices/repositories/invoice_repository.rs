// Invoice persistence and number allocation
//
// A number is allocated from the per-(channel, fiscal year) counter row in
// the same transaction that inserts the invoice, so a rolled-back insert
// never burns a number.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::{AppError, Result};
use crate::modules::invoices::models::{FiscalYear, Invoice, InvoiceDraft, PaymentChannel};
use crate::modules::invoices::services::invoice_numbering::generate_invoice_sequence;
use crate::modules::taxes::TaxBreakdown;

/// Numbers already taken (legacy imports) are skipped at most this many times per insert
const MAX_SKIPPED_NUMBERS: usize = 3;

/// Invoice storage port
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn find_by_source(
        &self,
        transaction_id: &str,
        admission_form_id: &str,
    ) -> Result<Option<Invoice>>;

    async fn find_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>>;

    /// Allocate the next number for the draft's channel and fiscal year and insert it
    ///
    /// Returns the stored invoice and whether this call created it; an
    /// invoice already stored for the same `(transaction_id, admission_form_id)`
    /// is returned as-is.
    ///
    /// # Errors
    /// * `SequenceConflict` - the allocated number collided with another writer
    async fn create_numbered(&self, draft: &InvoiceDraft) -> Result<(Invoice, bool)>;
}

fn build_invoice(draft: &InvoiceDraft, invoice_number: String, sequence: u32) -> Invoice {
    Invoice {
        id: Uuid::new_v4().to_string(),
        invoice_number,
        channel: draft.channel,
        transaction_id: draft.transaction_id.clone(),
        admission_form_id: draft.admission_form_id.clone(),
        student_name: draft.student_name.clone(),
        student_email: draft.student_email.clone(),
        student_state: draft.student_state.clone(),
        course_id: draft.course_id.clone(),
        course_title: draft.course_title.clone(),
        amount: draft.amount,
        tax: draft.tax,
        fiscal_year_start: draft.fiscal_year.start,
        sequence,
        created_at: Utc::now(),
    }
}

fn sequence_from_count(count_in_period: u64) -> Result<u32> {
    u32::try_from(count_in_period + 1)
        .map_err(|_| AppError::Internal("Invoice sequence out of range".to_string()))
}

/// MySQL-backed invoice repository
pub struct MySqlInvoiceRepository {
    pool: MySqlPool,
}

impl MySqlInvoiceRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Bump the counter and return how many numbers were issued before this one
    async fn allocate(
        tx: &mut Transaction<'_, MySql>,
        channel: PaymentChannel,
        fiscal_year: &FiscalYear,
    ) -> Result<u64> {
        sqlx::query(
            r#"
            INSERT INTO invoice_counters (channel, fiscal_year_start, next_value)
            VALUES (?, ?, LAST_INSERT_ID(1))
            ON DUPLICATE KEY UPDATE next_value = LAST_INSERT_ID(next_value + 1)
            "#,
        )
        .bind(channel.as_str())
        .bind(fiscal_year.start)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to allocate invoice number: {}", e)))?;

        let (issued,): (u64,) = sqlx::query_as("SELECT LAST_INSERT_ID()")
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read invoice counter: {}", e)))?;

        issued
            .checked_sub(1)
            .ok_or_else(|| AppError::Internal("Invoice counter returned zero".to_string()))
    }

    async fn number_taken(tx: &mut Transaction<'_, MySql>, invoice_number: &str) -> Result<bool> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT id FROM invoices WHERE invoice_number = ?")
                .bind(invoice_number)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to check invoice number: {}", e)))?;
        Ok(found.is_some())
    }

    async fn insert(tx: &mut Transaction<'_, MySql>, invoice: &Invoice) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, channel, transaction_id, admission_form_id,
                student_name, student_email, student_state, course_id, course_title,
                amount, cgst, sgst, igst, tax_amount, base_amount,
                fiscal_year_start, sequence, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.channel.as_str())
        .bind(&invoice.transaction_id)
        .bind(&invoice.admission_form_id)
        .bind(&invoice.student_name)
        .bind(&invoice.student_email)
        .bind(&invoice.student_state)
        .bind(&invoice.course_id)
        .bind(&invoice.course_title)
        .bind(invoice.amount)
        .bind(invoice.tax.cgst)
        .bind(invoice.tax.sgst)
        .bind(invoice.tax.igst)
        .bind(invoice.tax.tax_amount)
        .bind(invoice.tax.base_amount)
        .bind(invoice.fiscal_year_start)
        .bind(invoice.sequence)
        .bind(invoice.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

const INVOICE_COLUMNS: &str = r#"
    id, invoice_number, channel, transaction_id, admission_form_id,
    student_name, student_email, student_state, course_id, course_title,
    amount, cgst, sgst, igst, tax_amount, base_amount,
    fiscal_year_start, sequence, created_at
"#;

#[async_trait]
impl InvoiceRepository for MySqlInvoiceRepository {
    async fn find_by_source(
        &self,
        transaction_id: &str,
        admission_form_id: &str,
    ) -> Result<Option<Invoice>> {
        let query = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE transaction_id = ? AND admission_form_id = ?"
        );

        let row = sqlx::query_as::<_, InvoiceRow>(&query)
            .bind(transaction_id)
            .bind(admission_form_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch invoice: {}", e)))?;

        row.map(Invoice::try_from).transpose()
    }

    async fn find_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>> {
        let query = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_number = ?");

        let row = sqlx::query_as::<_, InvoiceRow>(&query)
            .bind(invoice_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch invoice: {}", e)))?;

        row.map(Invoice::try_from).transpose()
    }

    async fn create_numbered(&self, draft: &InvoiceDraft) -> Result<(Invoice, bool)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        let mut allocated = None;
        for _ in 0..MAX_SKIPPED_NUMBERS {
            let count = Self::allocate(&mut tx, draft.channel, &draft.fiscal_year).await?;
            let number = generate_invoice_sequence(
                draft.channel.prefix(),
                draft.fiscal_year.start,
                draft.fiscal_year.end,
                count,
            )?;
            if !Self::number_taken(&mut tx, &number).await? {
                allocated = Some((number, sequence_from_count(count)?));
                break;
            }
            tracing::warn!(invoice_number = number.as_str(), "Skipping invoice number already in use");
        }

        let (number, sequence) = allocated.ok_or_else(|| {
            AppError::SequenceConflict(format!(
                "No free {} invoice number in {}",
                draft.channel,
                draft.fiscal_year.label()
            ))
        })?;

        let invoice = build_invoice(draft, number, sequence);

        if let Err(e) = Self::insert(&mut tx, &invoice).await {
            let unique = e
                .as_database_error()
                .map(|db_err| db_err.is_unique_violation())
                .unwrap_or(false);
            drop(tx);

            if !unique {
                return Err(AppError::Internal(format!("Failed to insert invoice: {}", e)));
            }

            // Either a concurrent request raised the same invoice, or the number collided
            if let Some(existing) = self
                .find_by_source(&draft.transaction_id, &draft.admission_form_id)
                .await?
            {
                return Ok((existing, false));
            }
            return Err(AppError::SequenceConflict(invoice.invoice_number));
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok((invoice, true))
    }
}

/// Database row representation for the invoices table
#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    invoice_number: String,
    channel: String,
    transaction_id: String,
    admission_form_id: String,
    student_name: String,
    student_email: String,
    student_state: String,
    course_id: String,
    course_title: String,
    amount: Decimal,
    cgst: Decimal,
    sgst: Decimal,
    igst: Decimal,
    tax_amount: Decimal,
    base_amount: Decimal,
    fiscal_year_start: NaiveDate,
    sequence: u32,
    created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = AppError;

    fn try_from(row: InvoiceRow) -> Result<Self> {
        Ok(Invoice {
            channel: PaymentChannel::try_from(row.channel).map_err(AppError::Internal)?,
            id: row.id,
            invoice_number: row.invoice_number,
            transaction_id: row.transaction_id,
            admission_form_id: row.admission_form_id,
            student_name: row.student_name,
            student_email: row.student_email,
            student_state: row.student_state,
            course_id: row.course_id,
            course_title: row.course_title,
            amount: row.amount,
            tax: TaxBreakdown {
                cgst: row.cgst,
                sgst: row.sgst,
                igst: row.igst,
                tax_amount: row.tax_amount,
                base_amount: row.base_amount,
            },
            fiscal_year_start: row.fiscal_year_start,
            sequence: row.sequence,
            created_at: row.created_at,
        })
    }
}

#[derive(Default)]
struct InMemoryInvoices {
    counters: HashMap<(PaymentChannel, NaiveDate), u64>,
    invoices: Vec<Invoice>,
}

/// In-process invoice repository; one mutex makes allocation and insert atomic
#[derive(Default)]
pub struct InMemoryInvoiceRepository {
    state: Mutex<InMemoryInvoices>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an invoice without touching the counters, as a legacy import would
    pub async fn import(&self, invoice: Invoice) {
        self.state.lock().await.invoices.push(invoice);
    }

    pub async fn all(&self) -> Vec<Invoice> {
        self.state.lock().await.invoices.clone()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn find_by_source(
        &self,
        transaction_id: &str,
        admission_form_id: &str,
    ) -> Result<Option<Invoice>> {
        Ok(self
            .state
            .lock()
            .await
            .invoices
            .iter()
            .find(|i| i.transaction_id == transaction_id && i.admission_form_id == admission_form_id)
            .cloned())
    }

    async fn find_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>> {
        Ok(self
            .state
            .lock()
            .await
            .invoices
            .iter()
            .find(|i| i.invoice_number == invoice_number)
            .cloned())
    }

    async fn create_numbered(&self, draft: &InvoiceDraft) -> Result<(Invoice, bool)> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.invoices.iter().find(|i| {
            i.transaction_id == draft.transaction_id && i.admission_form_id == draft.admission_form_id
        }) {
            return Ok((existing.clone(), false));
        }

        let key = (draft.channel, draft.fiscal_year.start);
        for _ in 0..MAX_SKIPPED_NUMBERS {
            let counter = state.counters.entry(key).or_insert(0);
            let count = *counter;
            *counter += 1;

            let number = generate_invoice_sequence(
                draft.channel.prefix(),
                draft.fiscal_year.start,
                draft.fiscal_year.end,
                count,
            )?;

            if state.invoices.iter().any(|i| i.invoice_number == number) {
                continue;
            }

            let invoice = build_invoice(draft, number, sequence_from_count(count)?);
            state.invoices.push(invoice.clone());
            return Ok((invoice, true));
        }

        Err(AppError::SequenceConflict(format!(
            "No free {} invoice number in {}",
            draft.channel,
            draft.fiscal_year.label()
        )))
    }
}

// Purchase record persistence
//
// Every state change of a plan goes through `record_installment`, which
// locks the plan-opening row, applies the transition and appends the
// installment row inside one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};
use tokio::sync::Mutex;

use crate::core::{AppError, Result};
use crate::modules::ledger::models::{InstallmentApplied, InstallmentPayment, PurchaseRecord};

const RECORD_COLUMNS: &str = r#"
    id, user_id, course_id, course_title, amount, transaction_id,
    plan_transaction_id, purchased_at, promo_code, is_emi, total_emi_months,
    months_left, emi_amount, next_emi_due_date, installment_amounts, processing_fee
"#;

/// Storage port for the installment ledger
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Insert a plan-opening record
    ///
    /// Fails with `DuplicateActivePlan` when the user already has an active
    /// plan for the course. The check and the insert are atomic.
    async fn append_plan_record(&self, record: &PurchaseRecord) -> Result<()>;

    /// Active plan-opening record for `(user, course, plan transaction)`
    async fn find_active_plan(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<Option<PurchaseRecord>>;

    /// Apply a paid installment: decrement the plan and append the payment
    ///
    /// # Errors
    /// * `PlanNotFound` - no active plan matches the payment
    /// * `InstallmentAlreadyRecorded` - the payment's transaction id is already stored
    /// * `InstallmentSuperseded` - the payment names an installment that is no longer current
    /// * `Validation` - the payment differs from the scheduled installment or exceeds the plan total
    async fn record_installment(&self, payment: &InstallmentPayment) -> Result<InstallmentApplied>;

    /// All active plan-opening records of a user
    async fn list_active_plans(&self, user_id: &str) -> Result<Vec<PurchaseRecord>>;

    /// Every record belonging to one plan, oldest first
    async fn list_plan_records(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<Vec<PurchaseRecord>>;

    /// Delete every record of a plan, returning how many were removed
    async fn delete_plan(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<u64>;
}

/// MySQL-backed ledger
pub struct MySqlLedgerRepository {
    pool: MySqlPool,
}

impl MySqlLedgerRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn insert_record(
        tx: &mut Transaction<'_, MySql>,
        record: &PurchaseRecord,
    ) -> std::result::Result<(), sqlx::Error> {
        let installment_amounts = if record.installment_amounts.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&record.installment_amounts)
                    .map_err(|e| sqlx::Error::Encode(Box::new(e)))?,
            )
        };

        sqlx::query(
            r#"
            INSERT INTO purchase_records (
                id, user_id, course_id, course_title, amount, transaction_id,
                plan_transaction_id, purchased_at, promo_code, is_emi, total_emi_months,
                months_left, emi_amount, next_emi_due_date, installment_amounts, processing_fee
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.course_id)
        .bind(&record.course_title)
        .bind(record.amount)
        .bind(&record.transaction_id)
        .bind(&record.plan_transaction_id)
        .bind(record.purchased_at)
        .bind(&record.promo_code)
        .bind(record.is_emi)
        .bind(record.total_emi_months as i32)
        .bind(record.months_left as i32)
        .bind(record.emi_amount)
        .bind(record.next_emi_due_date)
        .bind(installment_amounts)
        .bind(record.processing_fee)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn active_plan_of(
        tx: &mut Transaction<'_, MySql>,
        record: &PurchaseRecord,
    ) -> Result<Option<String>> {
        let existing: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT transaction_id FROM purchase_records
            WHERE active_plan_key = CONCAT(?, ':', ?)
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.course_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to check active plans: {}", e)))?;

        Ok(existing.map(|(plan_txn,)| plan_txn))
    }

    async fn transaction_exists(
        tx: &mut Transaction<'_, MySql>,
        transaction_id: &str,
    ) -> Result<bool> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT id FROM purchase_records WHERE transaction_id = ?")
                .bind(transaction_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to look up transaction: {}", e)))?;
        Ok(found.is_some())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

/// Why inserting a plan-opening record was refused
#[derive(Debug, PartialEq, Eq)]
enum PlanConflict {
    ActivePlan,
    Transaction,
}

const ACTIVE_PLAN_KEY: &str = "uq_purchase_records_active_plan";

/// SQLSTATE InnoDB reports when it breaks a deadlock
const DEADLOCK_SQLSTATE: &str = "40001";

fn plan_insert_conflict(err: &sqlx::Error) -> Option<PlanConflict> {
    let db_err = err.as_database_error()?;

    if db_err.is_unique_violation() {
        return Some(if db_err.message().contains(ACTIVE_PLAN_KEY) {
            PlanConflict::ActivePlan
        } else {
            PlanConflict::Transaction
        });
    }

    // concurrent inserts of the same active plan key can deadlock on the index
    if db_err.code().as_deref() == Some(DEADLOCK_SQLSTATE) {
        return Some(PlanConflict::ActivePlan);
    }

    None
}

fn duplicate_active_plan(record: &PurchaseRecord, plan_txn: &str) -> AppError {
    AppError::DuplicateActivePlan(format!(
        "User {} already has plan {} for course {}",
        record.user_id, plan_txn, record.course_id
    ))
}

#[async_trait]
impl LedgerRepository for MySqlLedgerRepository {
    async fn append_plan_record(&self, record: &PurchaseRecord) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        // uq_purchase_records_active_plan settles races; this read only names the holder
        if let Some(plan_txn) = Self::active_plan_of(&mut tx, record).await? {
            return Err(duplicate_active_plan(record, &plan_txn));
        }

        if let Err(e) = Self::insert_record(&mut tx, record).await {
            return Err(match plan_insert_conflict(&e) {
                Some(PlanConflict::ActivePlan) => duplicate_active_plan(record, "in progress"),
                Some(PlanConflict::Transaction) => AppError::validation(format!(
                    "Transaction '{}' is already recorded",
                    record.transaction_id
                )),
                None => AppError::Internal(format!("Failed to insert plan record: {}", e)),
            });
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    async fn find_active_plan(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<Option<PurchaseRecord>> {
        let query = format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM purchase_records
            WHERE user_id = ? AND course_id = ? AND transaction_id = ?
              AND plan_transaction_id = transaction_id AND is_emi = TRUE AND months_left > 0
            "#
        );

        let row = sqlx::query_as::<_, PurchaseRecordRow>(&query)
            .bind(user_id)
            .bind(course_id)
            .bind(plan_transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch plan: {}", e)))?;

        row.map(PurchaseRecord::try_from).transpose()
    }

    async fn record_installment(&self, payment: &InstallmentPayment) -> Result<InstallmentApplied> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        let query = format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM purchase_records
            WHERE user_id = ? AND course_id = ? AND transaction_id = ?
              AND plan_transaction_id = transaction_id AND is_emi = TRUE
            FOR UPDATE
            "#
        );

        let plan: PurchaseRecord = sqlx::query_as::<_, PurchaseRecordRow>(&query)
            .bind(&payment.user_id)
            .bind(&payment.course_id)
            .bind(&payment.plan_transaction_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to lock plan: {}", e)))?
            .ok_or_else(|| {
                AppError::plan_not_found(format!(
                    "No EMI plan {} for course {}",
                    payment.plan_transaction_id, payment.course_id
                ))
            })?
            .try_into()?;

        if Self::transaction_exists(&mut tx, &payment.transaction_id).await? {
            return Err(AppError::InstallmentAlreadyRecorded(payment.transaction_id.clone()));
        }

        let (paid_so_far,): (Option<Decimal>,) = sqlx::query_as(
            r#"
            SELECT SUM(amount) FROM purchase_records
            WHERE user_id = ? AND plan_transaction_id = ?
            "#,
        )
        .bind(&payment.user_id)
        .bind(&payment.plan_transaction_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to sum plan payments: {}", e)))?;

        let applied = plan.apply_installment(payment, paid_so_far.unwrap_or(Decimal::ZERO))?;

        // Guarded on the locked value so a concurrent writer cannot double-decrement
        let updated = sqlx::query(
            r#"
            UPDATE purchase_records
            SET next_emi_due_date = ?, months_left = ?
            WHERE id = ? AND months_left = ? AND months_left > 0
            "#,
        )
        .bind(applied.plan.next_emi_due_date)
        .bind(applied.plan.months_left as i32)
        .bind(&plan.id)
        .bind(plan.months_left as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update plan: {}", e)))?;

        if updated.rows_affected() != 1 {
            return Err(AppError::plan_not_found(format!(
                "EMI plan {} changed concurrently",
                payment.plan_transaction_id
            )));
        }

        Self::insert_record(&mut tx, &applied.installment)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return AppError::InstallmentAlreadyRecorded(payment.transaction_id.clone());
                }
                AppError::Internal(format!("Failed to insert installment record: {}", e))
            })?;

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(applied)
    }

    async fn list_active_plans(&self, user_id: &str) -> Result<Vec<PurchaseRecord>> {
        let query = format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM purchase_records
            WHERE user_id = ? AND is_emi = TRUE
              AND transaction_id = plan_transaction_id AND months_left > 0
            ORDER BY next_emi_due_date ASC, purchased_at ASC
            "#
        );

        let rows = sqlx::query_as::<_, PurchaseRecordRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to list active plans: {}", e)))?;

        rows.into_iter().map(PurchaseRecord::try_from).collect()
    }

    async fn list_plan_records(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<Vec<PurchaseRecord>> {
        let query = format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM purchase_records
            WHERE user_id = ? AND course_id = ? AND plan_transaction_id = ?
            ORDER BY purchased_at ASC, months_left DESC
            "#
        );

        let rows = sqlx::query_as::<_, PurchaseRecordRow>(&query)
            .bind(user_id)
            .bind(course_id)
            .bind(plan_transaction_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to list plan records: {}", e)))?;

        rows.into_iter().map(PurchaseRecord::try_from).collect()
    }

    async fn delete_plan(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM purchase_records
            WHERE user_id = ? AND course_id = ? AND plan_transaction_id = ?
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(plan_transaction_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to delete plan: {}", e)))?;

        Ok(result.rows_affected())
    }
}

/// Database row representation for the purchase_records table
#[derive(sqlx::FromRow)]
struct PurchaseRecordRow {
    id: String,
    user_id: String,
    course_id: String,
    course_title: String,
    amount: Decimal,
    transaction_id: String,
    plan_transaction_id: String,
    purchased_at: DateTime<Utc>,
    promo_code: Option<String>,
    is_emi: bool,
    total_emi_months: i32,
    months_left: i32,
    emi_amount: Decimal,
    next_emi_due_date: Option<DateTime<Utc>>,
    installment_amounts: Option<String>,
    processing_fee: Decimal,
}

impl TryFrom<PurchaseRecordRow> for PurchaseRecord {
    type Error = AppError;

    fn try_from(row: PurchaseRecordRow) -> Result<Self> {
        let installment_amounts = match row.installment_amounts.as_deref() {
            Some(json) if !json.trim().is_empty() => serde_json::from_str(json).map_err(|e| {
                AppError::Internal(format!(
                    "Record {} has malformed installment amounts: {}",
                    row.id, e
                ))
            })?,
            _ => Vec::new(),
        };

        let total_emi_months = u32::try_from(row.total_emi_months)
            .map_err(|_| AppError::Internal(format!("Record {} has negative total months", row.id)))?;
        let months_left = u32::try_from(row.months_left)
            .map_err(|_| AppError::Internal(format!("Record {} has negative months left", row.id)))?;

        Ok(PurchaseRecord {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            course_title: row.course_title,
            amount: row.amount,
            transaction_id: row.transaction_id,
            plan_transaction_id: row.plan_transaction_id,
            purchased_at: row.purchased_at,
            promo_code: row.promo_code,
            is_emi: row.is_emi,
            total_emi_months,
            months_left,
            emi_amount: row.emi_amount,
            next_emi_due_date: row.next_emi_due_date,
            installment_amounts,
            processing_fee: row.processing_fee,
        })
    }
}

/// In-process ledger; one mutex serializes every mutation
#[derive(Default)]
pub struct InMemoryLedgerRepository {
    records: Mutex<Vec<PurchaseRecord>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, in insertion order
    pub async fn all_records(&self) -> Vec<PurchaseRecord> {
        self.records.lock().await.clone()
    }
}

fn is_plan_of(record: &PurchaseRecord, user_id: &str, course_id: &str, plan_txn: &str) -> bool {
    record.is_plan_record()
        && record.user_id == user_id
        && record.course_id == course_id
        && record.transaction_id == plan_txn
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn append_plan_record(&self, record: &PurchaseRecord) -> Result<()> {
        let mut records = self.records.lock().await;

        if let Some(existing) = records.iter().find(|r| {
            r.is_active() && r.user_id == record.user_id && r.course_id == record.course_id
        }) {
            return Err(AppError::DuplicateActivePlan(format!(
                "User {} already has plan {} for course {}",
                record.user_id, existing.plan_transaction_id, record.course_id
            )));
        }

        if records.iter().any(|r| r.transaction_id == record.transaction_id) {
            return Err(AppError::validation(format!(
                "Transaction '{}' is already recorded",
                record.transaction_id
            )));
        }

        records.push(record.clone());
        Ok(())
    }

    async fn find_active_plan(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<Option<PurchaseRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .find(|r| is_plan_of(r, user_id, course_id, plan_transaction_id) && r.months_left > 0)
            .cloned())
    }

    async fn record_installment(&self, payment: &InstallmentPayment) -> Result<InstallmentApplied> {
        let mut records = self.records.lock().await;

        let position = records
            .iter()
            .position(|r| {
                is_plan_of(r, &payment.user_id, &payment.course_id, &payment.plan_transaction_id)
            })
            .ok_or_else(|| {
                AppError::plan_not_found(format!(
                    "No EMI plan {} for course {}",
                    payment.plan_transaction_id, payment.course_id
                ))
            })?;

        if records.iter().any(|r| r.transaction_id == payment.transaction_id) {
            return Err(AppError::InstallmentAlreadyRecorded(payment.transaction_id.clone()));
        }

        let paid_so_far: Decimal = records
            .iter()
            .filter(|r| {
                r.user_id == payment.user_id && r.plan_transaction_id == payment.plan_transaction_id
            })
            .map(|r| r.amount)
            .sum();

        let applied = records[position].apply_installment(payment, paid_so_far)?;

        records[position] = applied.plan.clone();
        records.push(applied.installment.clone());

        Ok(applied)
    }

    async fn list_active_plans(&self, user_id: &str) -> Result<Vec<PurchaseRecord>> {
        let records = self.records.lock().await;
        let mut active: Vec<PurchaseRecord> = records
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|r| (r.next_emi_due_date, r.purchased_at));
        Ok(active)
    }

    async fn list_plan_records(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<Vec<PurchaseRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.course_id == course_id
                    && r.plan_transaction_id == plan_transaction_id
            })
            .cloned()
            .collect())
    }

    async fn delete_plan(
        &self,
        user_id: &str,
        course_id: &str,
        plan_transaction_id: &str,
    ) -> Result<u64> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| {
            !(r.user_id == user_id
                && r.course_id == course_id
                && r.plan_transaction_id == plan_transaction_id)
        });
        Ok((before - records.len()) as u64)
    }
}

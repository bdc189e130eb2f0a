use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use tokio::sync::RwLock;

use crate::core::{AppError, Result};
use crate::modules::offline_emi::models::{OfflineEmi, OfflineEmiStatus, ScheduleEntry};

const OFFLINE_EMI_COLUMNS: &str = r#"
    id, student_name, student_email, student_phone, course_name, total_amount,
    monthly_emi_amount, total_emis, emis_paid_months, emis_left, total_emi_paid,
    total_emi_due, emi_schedule, status, created_at, updated_at
"#;

/// Storage port for cash installment plans
#[async_trait]
pub trait OfflineEmiRepository: Send + Sync {
    async fn insert(&self, emi: &OfflineEmi) -> Result<()>;

    async fn find(&self, id: &str) -> Result<Option<OfflineEmi>>;

    /// Mark one schedule entry paid and persist the recomputed plan atomically
    ///
    /// # Errors
    /// * `NotFound` - unknown plan
    /// * `Validation` - bad index or entry already paid
    async fn mark_installment_paid(
        &self,
        id: &str,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<OfflineEmi>;
}

/// MySQL-backed offline EMI storage; the schedule is kept as a JSON column
pub struct MySqlOfflineEmiRepository {
    pool: MySqlPool,
}

impl MySqlOfflineEmiRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn encode_schedule(schedule: &[ScheduleEntry]) -> Result<String> {
    serde_json::to_string(schedule).map_err(AppError::from)
}

#[async_trait]
impl OfflineEmiRepository for MySqlOfflineEmiRepository {
    async fn insert(&self, emi: &OfflineEmi) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO offline_emis (
                id, student_name, student_email, student_phone, course_name, total_amount,
                monthly_emi_amount, total_emis, emis_paid_months, emis_left, total_emi_paid,
                total_emi_due, emi_schedule, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&emi.id)
        .bind(&emi.student_name)
        .bind(&emi.student_email)
        .bind(&emi.student_phone)
        .bind(&emi.course_name)
        .bind(emi.total_amount)
        .bind(emi.monthly_emi_amount)
        .bind(emi.total_emis as i32)
        .bind(emi.emis_paid_months as i32)
        .bind(emi.emis_left as i32)
        .bind(emi.total_emi_paid)
        .bind(emi.total_emi_due)
        .bind(encode_schedule(&emi.emi_schedule)?)
        .bind(emi.status.as_str())
        .bind(emi.created_at)
        .bind(emi.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to insert offline EMI: {}", e)))?;

        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<OfflineEmi>> {
        let query = format!("SELECT {OFFLINE_EMI_COLUMNS} FROM offline_emis WHERE id = ?");

        let row = sqlx::query_as::<_, OfflineEmiRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch offline EMI: {}", e)))?;

        row.map(OfflineEmi::try_from).transpose()
    }

    async fn mark_installment_paid(
        &self,
        id: &str,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<OfflineEmi> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        let query =
            format!("SELECT {OFFLINE_EMI_COLUMNS} FROM offline_emis WHERE id = ? FOR UPDATE");

        let mut emi: OfflineEmi = sqlx::query_as::<_, OfflineEmiRow>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to lock offline EMI: {}", e)))?
            .ok_or_else(|| AppError::not_found(format!("Offline EMI {}", id)))?
            .try_into()?;

        emi.mark_installment_paid(index, now)?;

        sqlx::query(
            r#"
            UPDATE offline_emis
            SET emis_paid_months = ?, emis_left = ?, total_emi_paid = ?, total_emi_due = ?,
                emi_schedule = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(emi.emis_paid_months as i32)
        .bind(emi.emis_left as i32)
        .bind(emi.total_emi_paid)
        .bind(emi.total_emi_due)
        .bind(encode_schedule(&emi.emi_schedule)?)
        .bind(emi.status.as_str())
        .bind(emi.updated_at)
        .bind(&emi.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update offline EMI: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(emi)
    }
}

/// Database row representation for the offline_emis table
#[derive(sqlx::FromRow)]
struct OfflineEmiRow {
    id: String,
    student_name: String,
    student_email: String,
    student_phone: String,
    course_name: String,
    total_amount: Decimal,
    monthly_emi_amount: Decimal,
    total_emis: i32,
    emis_paid_months: i32,
    emis_left: i32,
    total_emi_paid: Decimal,
    total_emi_due: Decimal,
    emi_schedule: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OfflineEmiRow> for OfflineEmi {
    type Error = AppError;

    fn try_from(row: OfflineEmiRow) -> Result<Self> {
        let emi_schedule: Vec<ScheduleEntry> = serde_json::from_str(&row.emi_schedule)
            .map_err(|e| {
                AppError::Internal(format!("Offline EMI {} has a malformed schedule: {}", row.id, e))
            })?;

        let counter = |value: i32, name: &str| {
            u32::try_from(value).map_err(|_| {
                AppError::Internal(format!("Offline EMI {} has negative {}", row.id, name))
            })
        };

        Ok(OfflineEmi {
            total_emis: counter(row.total_emis, "total_emis")?,
            emis_paid_months: counter(row.emis_paid_months, "emis_paid_months")?,
            emis_left: counter(row.emis_left, "emis_left")?,
            status: OfflineEmiStatus::try_from(row.status).map_err(AppError::Internal)?,
            id: row.id,
            student_name: row.student_name,
            student_email: row.student_email,
            student_phone: row.student_phone,
            course_name: row.course_name,
            total_amount: row.total_amount,
            monthly_emi_amount: row.monthly_emi_amount,
            total_emi_paid: row.total_emi_paid,
            total_emi_due: row.total_emi_due,
            emi_schedule,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// In-memory offline EMI storage used by tests and local runs
#[derive(Default)]
pub struct InMemoryOfflineEmiRepository {
    plans: RwLock<HashMap<String, OfflineEmi>>,
}

impl InMemoryOfflineEmiRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineEmiRepository for InMemoryOfflineEmiRepository {
    async fn insert(&self, emi: &OfflineEmi) -> Result<()> {
        let mut plans = self.plans.write().await;
        if plans.contains_key(&emi.id) {
            return Err(AppError::validation(format!("Offline EMI {} already exists", emi.id)));
        }
        plans.insert(emi.id.clone(), emi.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<OfflineEmi>> {
        Ok(self.plans.read().await.get(id).cloned())
    }

    async fn mark_installment_paid(
        &self,
        id: &str,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<OfflineEmi> {
        let mut plans = self.plans.write().await;
        let stored = plans
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("Offline EMI {}", id)))?;

        // Apply to a copy so a rejected flip leaves the stored plan untouched
        let mut updated = stored.clone();
        updated.mark_installment_paid(index, now)?;
        *stored = updated.clone();

        Ok(updated)
    }
}

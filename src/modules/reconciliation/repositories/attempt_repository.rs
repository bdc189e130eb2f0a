// Payment attempt persistence
//
// Status changes are conditional on the current status so that concurrent
// callbacks, webhooks and the expiry sweep cannot overwrite each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::core::{AppError, Paise, Result};
use crate::modules::reconciliation::models::{AttemptStatus, PaymentAttempt};

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Insert an initiated attempt and claim its installment
    ///
    /// Returns `false`, storing nothing, when another unexpired initiated
    /// attempt already holds the installment. A holder past its expiry is
    /// expired first.
    async fn insert(&self, attempt: &PaymentAttempt) -> Result<bool>;

    async fn find(&self, merchant_order_id: &str) -> Result<Option<PaymentAttempt>>;

    /// Latest initiated, unexpired attempt for one installment of a plan
    async fn find_live(
        &self,
        user_id: &str,
        plan_transaction_id: &str,
        installment_number: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentAttempt>>;

    /// Store the checkout session returned by the gateway
    async fn attach_session(
        &self,
        merchant_order_id: &str,
        gateway_order_id: &str,
        redirect_url: &str,
    ) -> Result<()>;

    /// Move an attempt to `to` if its current status is one of `from`
    ///
    /// Returns whether a row changed.
    async fn transition(
        &self,
        merchant_order_id: &str,
        from: &[AttemptStatus],
        to: AttemptStatus,
    ) -> Result<bool>;

    /// Mark every initiated attempt past its expiry as expired
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// MySQL-backed attempt repository
pub struct MySqlAttemptRepository {
    pool: MySqlPool,
}

impl MySqlAttemptRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const ATTEMPT_COLUMNS: &str = r#"
    merchant_order_id, user_id, course_id, plan_transaction_id, installment_number,
    amount_minor, session_token, gateway_order_id, redirect_url, status,
    created_at, expires_at, updated_at
"#;

#[async_trait]
impl AttemptRepository for MySqlAttemptRepository {
    async fn insert(&self, attempt: &PaymentAttempt) -> Result<bool> {
        let live_key = attempt.live_key();
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE payment_attempts
            SET status = 'expired', live_key = NULL, updated_at = ?
            WHERE live_key = ? AND status = 'initiated' AND expires_at <= ?
            "#,
        )
        .bind(now)
        .bind(&live_key)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to release expired attempt: {}", e)))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_attempts (
                merchant_order_id, user_id, course_id, plan_transaction_id, installment_number,
                amount_minor, session_token, gateway_order_id, redirect_url, status,
                created_at, expires_at, updated_at, live_key
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.merchant_order_id)
        .bind(&attempt.user_id)
        .bind(&attempt.course_id)
        .bind(&attempt.plan_transaction_id)
        .bind(attempt.installment_number as i32)
        .bind(attempt.amount_minor.value())
        .bind(&attempt.session_token)
        .bind(&attempt.gateway_order_id)
        .bind(&attempt.redirect_url)
        .bind(attempt.status.as_str())
        .bind(attempt.created_at)
        .bind(attempt.expires_at)
        .bind(attempt.updated_at)
        .bind(&live_key)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(true),
            // uq_payment_attempts_live: another attempt holds the installment
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(AppError::Internal(format!(
                "Failed to insert payment attempt: {}",
                e
            ))),
        }
    }

    async fn find(&self, merchant_order_id: &str) -> Result<Option<PaymentAttempt>> {
        let query = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE merchant_order_id = ?"
        );

        let row = sqlx::query_as::<_, AttemptRow>(&query)
            .bind(merchant_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch payment attempt: {}", e)))?;

        row.map(PaymentAttempt::try_from).transpose()
    }

    async fn find_live(
        &self,
        user_id: &str,
        plan_transaction_id: &str,
        installment_number: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentAttempt>> {
        let query = format!(
            r#"
            SELECT {ATTEMPT_COLUMNS} FROM payment_attempts
            WHERE user_id = ? AND plan_transaction_id = ? AND installment_number = ?
              AND status = 'initiated' AND expires_at > ?
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query_as::<_, AttemptRow>(&query)
            .bind(user_id)
            .bind(plan_transaction_id)
            .bind(installment_number as i32)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to fetch live attempt: {}", e)))?;

        row.map(PaymentAttempt::try_from).transpose()
    }

    async fn attach_session(
        &self,
        merchant_order_id: &str,
        gateway_order_id: &str,
        redirect_url: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_attempts
            SET gateway_order_id = ?, redirect_url = ?, updated_at = ?
            WHERE merchant_order_id = ?
            "#,
        )
        .bind(gateway_order_id)
        .bind(redirect_url)
        .bind(Utc::now())
        .bind(merchant_order_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store checkout session: {}", e)))?;

        Ok(())
    }

    async fn transition(
        &self,
        merchant_order_id: &str,
        from: &[AttemptStatus],
        to: AttemptStatus,
    ) -> Result<bool> {
        if from.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; from.len()].join(", ");
        let query = format!(
            r#"
            UPDATE payment_attempts
            SET status = ?, live_key = NULL, updated_at = ?
            WHERE merchant_order_id = ? AND status IN ({placeholders})
            "#
        );

        let mut statement = sqlx::query(&query)
            .bind(to.as_str())
            .bind(Utc::now())
            .bind(merchant_order_id);
        for status in from {
            statement = statement.bind(status.as_str());
        }

        let result = statement
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to update attempt status: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payment_attempts
            SET status = 'expired', live_key = NULL, updated_at = ?
            WHERE status = 'initiated' AND expires_at <= ?
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to expire attempts: {}", e)))?;

        Ok(result.rows_affected())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

/// Database row representation for the payment_attempts table
#[derive(sqlx::FromRow)]
struct AttemptRow {
    merchant_order_id: String,
    user_id: String,
    course_id: String,
    plan_transaction_id: String,
    installment_number: i32,
    amount_minor: i64,
    session_token: String,
    gateway_order_id: Option<String>,
    redirect_url: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for PaymentAttempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self> {
        let status = AttemptStatus::try_from(row.status).map_err(AppError::Internal)?;
        let installment_number = u32::try_from(row.installment_number).map_err(|_| {
            AppError::Internal(format!(
                "Attempt {} has invalid installment number",
                row.merchant_order_id
            ))
        })?;

        Ok(PaymentAttempt {
            merchant_order_id: row.merchant_order_id,
            user_id: row.user_id,
            course_id: row.course_id,
            plan_transaction_id: row.plan_transaction_id,
            installment_number,
            amount_minor: Paise::new(row.amount_minor),
            session_token: row.session_token,
            gateway_order_id: row.gateway_order_id,
            redirect_url: row.redirect_url,
            status,
            created_at: row.created_at,
            expires_at: row.expires_at,
            updated_at: row.updated_at,
        })
    }
}

/// In-process attempt repository for local runs and tests
#[derive(Default)]
pub struct InMemoryAttemptRepository {
    attempts: RwLock<HashMap<String, PaymentAttempt>>,
}

impl InMemoryAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.attempts.read().await.len()
    }
}

#[async_trait]
impl AttemptRepository for InMemoryAttemptRepository {
    async fn insert(&self, attempt: &PaymentAttempt) -> Result<bool> {
        let mut attempts = self.attempts.write().await;
        if attempts.contains_key(&attempt.merchant_order_id) {
            return Err(AppError::Internal(format!(
                "Duplicate merchant order id {}",
                attempt.merchant_order_id
            )));
        }

        let now = Utc::now();
        let live_key = attempt.live_key();
        for holder in attempts.values_mut() {
            if holder.status != AttemptStatus::Initiated || holder.live_key() != live_key {
                continue;
            }
            if holder.expires_at > now {
                return Ok(false);
            }
            holder.status = AttemptStatus::Expired;
            holder.updated_at = now;
        }

        attempts.insert(attempt.merchant_order_id.clone(), attempt.clone());
        Ok(true)
    }

    async fn find(&self, merchant_order_id: &str) -> Result<Option<PaymentAttempt>> {
        Ok(self.attempts.read().await.get(merchant_order_id).cloned())
    }

    async fn find_live(
        &self,
        user_id: &str,
        plan_transaction_id: &str,
        installment_number: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentAttempt>> {
        Ok(self
            .attempts
            .read()
            .await
            .values()
            .filter(|a| {
                a.user_id == user_id
                    && a.plan_transaction_id == plan_transaction_id
                    && a.installment_number == installment_number
                    && a.status == AttemptStatus::Initiated
                    && a.expires_at > now
            })
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn attach_session(
        &self,
        merchant_order_id: &str,
        gateway_order_id: &str,
        redirect_url: &str,
    ) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .get_mut(merchant_order_id)
            .ok_or_else(|| AppError::not_found(format!("Payment attempt {}", merchant_order_id)))?;
        attempt.gateway_order_id = Some(gateway_order_id.to_string());
        attempt.redirect_url = Some(redirect_url.to_string());
        attempt.updated_at = Utc::now();
        Ok(())
    }

    async fn transition(
        &self,
        merchant_order_id: &str,
        from: &[AttemptStatus],
        to: AttemptStatus,
    ) -> Result<bool> {
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(merchant_order_id) {
            Some(attempt) if from.contains(&attempt.status) => {
                attempt.status = to;
                attempt.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut attempts = self.attempts.write().await;
        let mut expired = 0;
        for attempt in attempts.values_mut() {
            if attempt.status == AttemptStatus::Initiated && attempt.expires_at <= now {
                attempt.status = AttemptStatus::Expired;
                attempt.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

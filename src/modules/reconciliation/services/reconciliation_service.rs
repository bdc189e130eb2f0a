use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::{AppError, Paise, Result};
use crate::modules::gateways::services::{parse_notification, verify_authorization};
use crate::modules::gateways::{ChargeMetadata, ChargeState, PaymentGateway};
use crate::modules::ledger::LedgerService;
use crate::modules::reconciliation::models::{AttemptStatus, PaymentAttempt};
use crate::modules::reconciliation::repositories::AttemptRepository;

/// Knobs for the reconciliation flow
#[derive(Debug, Clone)]
pub struct ReconciliationSettings {
    /// Base URL the gateway redirects the user back to
    pub public_base_url: String,
    pub attempt_ttl: chrono::Duration,
    pub gateway_timeout: Duration,
    pub webhook_username: String,
    pub webhook_password: String,
}

/// Where to send the user to complete an installment payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    pub order_id: String,
    pub redirect_url: String,
}

/// Identifiers carried back on the gateway redirect
#[derive(Debug, Clone)]
pub struct CallbackParams {
    pub order_id: String,
    pub course_id: String,
    pub original_txn: String,
    pub session_token: String,
}

/// Result of reconciling a gateway callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// Installment recorded by this call
    Recorded { months_left: u32 },
    /// Already recorded earlier, or the plan no longer needs it
    AlreadyProcessed,
    /// Gateway has not settled yet
    Pending,
    /// Money was taken for an installment that was already paid
    Surplus,
    Failed { reason: String },
}

impl CallbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Recorded { .. } | Self::AlreadyProcessed)
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Ties gateway charges to ledger writes
pub struct ReconciliationService {
    ledger: Arc<LedgerService>,
    attempts: Arc<dyn AttemptRepository>,
    gateway: Arc<dyn PaymentGateway>,
    settings: ReconciliationSettings,
}

impl ReconciliationService {
    pub fn new(
        ledger: Arc<LedgerService>,
        attempts: Arc<dyn AttemptRepository>,
        gateway: Arc<dyn PaymentGateway>,
        settings: ReconciliationSettings,
    ) -> Self {
        Self {
            ledger,
            attempts,
            gateway,
            settings,
        }
    }

    /// Start paying the next installment of a plan
    ///
    /// A second request for the same installment while a checkout is still
    /// open returns that checkout instead of creating another charge.
    ///
    /// # Errors
    /// * `PlanNotFound` - no active plan for `(user, course, original_transaction_id)`
    /// * `Validation` - a checkout for this installment is still being created
    /// * gateway errors - the attempt is marked failed
    pub async fn start_installment_payment(
        &self,
        user_id: &str,
        course_id: &str,
        original_transaction_id: &str,
    ) -> Result<PaymentInitiation> {
        let plan = self
            .ledger
            .find_active_plan(user_id, course_id, original_transaction_id)
            .await?;

        let installment_number = plan.current_installment_number();
        let amount = Paise::from_rupees(plan.current_installment_amount()?)?;
        let now = Utc::now();

        if let Some(live) = self
            .attempts
            .find_live(user_id, original_transaction_id, installment_number, now)
            .await?
        {
            return Self::reuse(live, installment_number, now);
        }

        let attempt = PaymentAttempt::new(
            user_id.to_string(),
            course_id.to_string(),
            original_transaction_id.to_string(),
            installment_number,
            amount,
            self.settings.attempt_ttl,
        )?;

        if !self.attempts.insert(&attempt).await? {
            // lost the claim to a concurrent request for the same installment
            let live = self
                .attempts
                .find_live(user_id, original_transaction_id, installment_number, Utc::now())
                .await?;
            return match live {
                Some(live) => Self::reuse(live, installment_number, Utc::now()),
                None => Err(Self::in_progress(installment_number)),
            };
        }

        let callback_url = build_callback_url(&self.settings.public_base_url, &attempt)?;
        let metadata = ChargeMetadata {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            plan_transaction_id: original_transaction_id.to_string(),
            installment_number,
        };

        let charge = self
            .with_timeout(self.gateway.initiate_charge(
                amount,
                &attempt.merchant_order_id,
                &metadata,
                &callback_url,
            ))
            .await;

        let session = match charge {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    merchant_order_id = attempt.merchant_order_id.as_str(),
                    gateway = self.gateway.name(),
                    error = %e,
                    "Gateway rejected installment charge"
                );
                self.attempts
                    .transition(
                        &attempt.merchant_order_id,
                        &[AttemptStatus::Initiated],
                        AttemptStatus::Failed,
                    )
                    .await?;
                return Err(e);
            }
        };

        self.attempts
            .attach_session(
                &attempt.merchant_order_id,
                &session.gateway_order_id,
                &session.redirect_url,
            )
            .await?;

        info!(
            user_id = user_id,
            course_id = course_id,
            plan_transaction_id = original_transaction_id,
            merchant_order_id = attempt.merchant_order_id.as_str(),
            installment_number = installment_number,
            amount = %amount,
            "Initiated installment payment"
        );

        Ok(PaymentInitiation {
            order_id: attempt.merchant_order_id,
            redirect_url: session.redirect_url,
        })
    }

    fn reuse(
        live: PaymentAttempt,
        installment_number: u32,
        now: chrono::DateTime<Utc>,
    ) -> Result<PaymentInitiation> {
        if !live.is_reusable(now) {
            return Err(Self::in_progress(installment_number));
        }

        info!(
            merchant_order_id = live.merchant_order_id.as_str(),
            installment_number = installment_number,
            "Reusing open checkout for installment"
        );
        Ok(PaymentInitiation {
            redirect_url: live.redirect_url.unwrap_or_default(),
            order_id: live.merchant_order_id,
        })
    }

    fn in_progress(installment_number: u32) -> AppError {
        AppError::validation(format!(
            "Payment for installment {} is already being initiated",
            installment_number
        ))
    }

    /// Reconcile the user's return from the gateway
    ///
    /// Safe to call any number of times for the same order; at most one
    /// installment is ever recorded per attempt.
    pub async fn handle_gateway_callback(&self, params: &CallbackParams) -> Result<CallbackOutcome> {
        let Some(attempt) = self.attempts.find(&params.order_id).await? else {
            warn!(merchant_order_id = params.order_id.as_str(), "Callback for unknown attempt");
            return Ok(CallbackOutcome::failed("Unknown payment attempt"));
        };

        if !attempt.matches_callback(&params.course_id, &params.original_txn, &params.session_token) {
            warn!(
                merchant_order_id = params.order_id.as_str(),
                course_id = params.course_id.as_str(),
                original_txn = params.original_txn.as_str(),
                "Callback parameters do not match the payment attempt"
            );
            return Ok(CallbackOutcome::failed("Callback parameters do not match"));
        }

        self.settle(&attempt).await
    }

    /// Reconcile a server-to-server notification
    ///
    /// The notification only names the order; its state is re-read from the
    /// gateway before anything is written.
    pub async fn handle_gateway_webhook(
        &self,
        authorization: Option<&str>,
        body: &str,
    ) -> Result<CallbackOutcome> {
        let authorized = !self.settings.webhook_username.is_empty()
            && authorization
                .map(|header| {
                    verify_authorization(
                        header,
                        &self.settings.webhook_username,
                        &self.settings.webhook_password,
                    )
                })
                .unwrap_or(false);

        if !authorized {
            warn!("Rejected gateway webhook with invalid authorization");
            return Err(AppError::unauthorized("Invalid webhook authorization"));
        }

        let notification = parse_notification(body)?;

        let Some(attempt) = self.attempts.find(&notification.merchant_order_id).await? else {
            warn!(
                merchant_order_id = notification.merchant_order_id.as_str(),
                event = notification.event.as_str(),
                "Webhook for unknown attempt"
            );
            return Ok(CallbackOutcome::failed("Unknown payment attempt"));
        };

        self.settle(&attempt).await
    }

    async fn settle(&self, attempt: &PaymentAttempt) -> Result<CallbackOutcome> {
        let order_id = attempt.merchant_order_id.as_str();

        match attempt.status {
            AttemptStatus::Confirmed => return Ok(CallbackOutcome::AlreadyProcessed),
            AttemptStatus::Surplus => return Ok(CallbackOutcome::Surplus),
            _ => {}
        }

        let status = match self.with_timeout(self.gateway.check_status(order_id)).await {
            Ok(status) => status,
            Err(e) if e.is_gateway_error() => {
                warn!(merchant_order_id = order_id, error = %e, "Gateway status unavailable");
                return Ok(CallbackOutcome::Pending);
            }
            Err(e) => return Err(e),
        };

        match status.state {
            ChargeState::Completed if status.amount != attempt.amount_minor => {
                error!(
                    merchant_order_id = order_id,
                    expected = %attempt.amount_minor,
                    reported = %status.amount,
                    "Gateway settled a different amount than requested"
                );
                self.mark(order_id, AttemptStatus::Failed).await?;
                Ok(CallbackOutcome::failed("Settled amount does not match"))
            }
            ChargeState::Completed => self.record(attempt).await,
            ChargeState::Failed => {
                self.mark(order_id, AttemptStatus::Failed).await?;
                info!(merchant_order_id = order_id, "Installment payment failed at gateway");
                Ok(CallbackOutcome::failed("Payment failed"))
            }
            ChargeState::Pending => Ok(CallbackOutcome::Pending),
        }
    }

    async fn record(&self, attempt: &PaymentAttempt) -> Result<CallbackOutcome> {
        let order_id = attempt.merchant_order_id.as_str();

        let result = self
            .ledger
            .record_scheduled_installment(
                &attempt.user_id,
                &attempt.course_id,
                &attempt.plan_transaction_id,
                attempt.installment_number,
                attempt.amount_minor,
                order_id,
            )
            .await;

        match result {
            Ok(plan) => {
                self.mark(order_id, AttemptStatus::Confirmed).await?;
                Ok(CallbackOutcome::Recorded {
                    months_left: plan.months_left,
                })
            }
            Err(AppError::InstallmentAlreadyRecorded(_)) => {
                self.mark(order_id, AttemptStatus::Confirmed).await?;
                Ok(CallbackOutcome::AlreadyProcessed)
            }
            Err(AppError::InstallmentSuperseded(reason)) => self.surplus(attempt, &reason).await,
            Err(AppError::PlanNotFound(reason)) => {
                let recorded = self
                    .ledger
                    .is_transaction_recorded(
                        &attempt.user_id,
                        &attempt.course_id,
                        &attempt.plan_transaction_id,
                        order_id,
                    )
                    .await?;

                if !recorded {
                    return self.surplus(attempt, &reason).await;
                }

                info!(
                    merchant_order_id = order_id,
                    reason = reason.as_str(),
                    "Plan no longer active, treating callback as processed"
                );
                self.mark(order_id, AttemptStatus::Confirmed).await?;
                Ok(CallbackOutcome::AlreadyProcessed)
            }
            Err(e) => Err(e),
        }
    }

    /// Park a settled attempt whose installment no longer needs paying
    async fn surplus(&self, attempt: &PaymentAttempt, reason: &str) -> Result<CallbackOutcome> {
        error!(
            merchant_order_id = attempt.merchant_order_id.as_str(),
            user_id = attempt.user_id.as_str(),
            plan_transaction_id = attempt.plan_transaction_id.as_str(),
            installment_number = attempt.installment_number,
            amount = %attempt.amount_minor,
            reason = reason,
            "Surplus installment payment settled, refund required"
        );
        self.mark(&attempt.merchant_order_id, AttemptStatus::Surplus)
            .await?;
        Ok(CallbackOutcome::Surplus)
    }

    /// Move an unconfirmed attempt to `to`; confirmed attempts never change
    async fn mark(&self, order_id: &str, to: AttemptStatus) -> Result<bool> {
        self.attempts
            .transition(
                order_id,
                &[
                    AttemptStatus::Initiated,
                    AttemptStatus::Failed,
                    AttemptStatus::Expired,
                ],
                to,
            )
            .await
    }

    async fn with_timeout<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.settings.gateway_timeout, call)
            .await
            .map_err(|_| {
                AppError::GatewayUnreachable(format!(
                    "{} did not answer within {:?}",
                    self.gateway.name(),
                    self.settings.gateway_timeout
                ))
            })?
    }
}

/// Callback URL for an attempt: `{base}/emi/callback?id&courseId&originalTxn&sessionToken`
pub fn build_callback_url(public_base_url: &str, attempt: &PaymentAttempt) -> Result<String> {
    let base = public_base_url.trim_end_matches('/');
    let mut url = reqwest::Url::parse(&format!("{}/emi/callback", base))
        .map_err(|e| AppError::Configuration(format!("Invalid public base URL: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("id", &attempt.merchant_order_id)
        .append_pair("courseId", &attempt.course_id)
        .append_pair("originalTxn", &attempt.plan_transaction_id)
        .append_pair("sessionToken", &attempt.session_token);

    Ok(url.into())
}

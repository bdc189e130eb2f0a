// HTTP handlers for installment payments
//
// Endpoints:
// - POST /emi/pay - Start paying the next installment of a plan
// - GET /emi/callback - User returns from the gateway checkout
// - POST /emi/webhook - PhonePe server-to-server notification

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::{error, info};

use crate::core::{AppError, Result};
use crate::middleware::CurrentUser;
use crate::modules::reconciliation::services::{
    CallbackOutcome, CallbackParams, ReconciliationService,
};

/// Pages the browser is sent to after a gateway callback
#[derive(Debug, Clone)]
pub struct RedirectPages {
    pub success_url: String,
    pub failure_url: String,
}

impl RedirectPages {
    fn location(&self, outcome: &CallbackOutcome, course_id: &str) -> String {
        let (base, status) = match outcome {
            CallbackOutcome::Recorded { .. } | CallbackOutcome::AlreadyProcessed => {
                (&self.success_url, "success")
            }
            CallbackOutcome::Pending => (&self.failure_url, "pending"),
            CallbackOutcome::Surplus => (&self.failure_url, "surplus"),
            CallbackOutcome::Failed { .. } => (&self.failure_url, "failed"),
        };

        match reqwest::Url::parse(base) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("courseId", course_id)
                    .append_pair("status", status);
                url.into()
            }
            Err(_) => base.clone(),
        }
    }
}

/// Request for POST /emi/pay
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayInstallmentRequest {
    pub course_id: String,
    /// Original transaction id of the plan
    pub transaction_id: String,
}

/// Query of GET /emi/callback; missing values fail the match instead of the request
#[derive(Debug, Default)]
pub struct CallbackQuery {
    pub id: String,
    pub course_id: String,
    pub original_txn: String,
    pub session_token: String,
}

impl CallbackQuery {
    /// Lenient parse: bad escapes are kept as literal text, unknown keys ignored
    pub fn parse(query_string: &str) -> Self {
        let mut query = Self::default();

        let Ok(mut url) = reqwest::Url::parse("http://callback.invalid/") else {
            return query;
        };
        url.set_query(Some(query_string));

        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "id" => &mut query.id,
                "courseId" => &mut query.course_id,
                "originalTxn" => &mut query.original_txn,
                "sessionToken" => &mut query.session_token,
                _ => continue,
            };
            *slot = value.into_owned();
        }

        query
    }
}

/// POST /emi/pay
///
/// # Request Body
/// ```json
/// {"courseId": "course-1", "transactionId": "TXN-0001"}
/// ```
///
/// # Returns
/// - 200: `{orderId, redirectUrl}`
/// - 404: No active plan for the course and transaction
/// - 502/504: Gateway failure
pub async fn pay_installment(
    user: CurrentUser,
    request: web::Json<PayInstallmentRequest>,
    service: web::Data<ReconciliationService>,
) -> Result<HttpResponse> {
    if request.course_id.trim().is_empty() || request.transaction_id.trim().is_empty() {
        return Err(AppError::validation("courseId and transactionId are required"));
    }

    let initiation = service
        .start_installment_payment(user.id(), &request.course_id, &request.transaction_id)
        .await?;

    Ok(HttpResponse::Ok().json(initiation))
}

/// GET /emi/callback
///
/// Always answers with a redirect; failures are logged, never shown as JSON.
pub async fn gateway_callback(
    req: HttpRequest,
    service: web::Data<ReconciliationService>,
    pages: web::Data<RedirectPages>,
) -> HttpResponse {
    let query = CallbackQuery::parse(req.query_string());
    let params = CallbackParams {
        order_id: query.id,
        course_id: query.course_id,
        original_txn: query.original_txn,
        session_token: query.session_token,
    };

    let outcome = match service.handle_gateway_callback(&params).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(merchant_order_id = params.order_id.as_str(), error = %e, "Callback handling failed");
            CallbackOutcome::Failed {
                reason: "Internal error".to_string(),
            }
        }
    };

    info!(
        merchant_order_id = params.order_id.as_str(),
        outcome = ?outcome,
        "Handled gateway callback"
    );

    HttpResponse::Found()
        .insert_header((header::LOCATION, pages.location(&outcome, &params.course_id)))
        .finish()
}

/// POST /emi/webhook
///
/// # Returns
/// - 200: `{"status": ...}` for every authorized notification
/// - 401: Authorization header missing or wrong
pub async fn gateway_webhook(
    req: HttpRequest,
    body: String,
    service: web::Data<ReconciliationService>,
) -> Result<HttpResponse> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let outcome = service.handle_gateway_webhook(authorization, &body).await?;

    Ok(HttpResponse::Ok().json(outcome))
}

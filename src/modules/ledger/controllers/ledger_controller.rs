// HTTP handlers for the installment ledger
//
// Endpoints:
// - GET /emi/pay - Active plans of the calling user (pay-now listing)
// - GET /emi/due?withinDays=N - Plans with an installment due soon
// - GET /emi/plans/{course_id}/history/{txn} - All records of one plan
// - DELETE /admin/users/{user_id}/emi/{course_id}/{txn} - Remove a plan

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::middleware::CurrentUser;
use crate::modules::ledger::services::LedgerService;

const DEFAULT_DUE_WINDOW_DAYS: u32 = 7;
const MAX_DUE_WINDOW_DAYS: u32 = 366;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueQuery {
    pub within_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RemovePlanResponse {
    pub removed: u64,
}

/// GET /emi/pay
///
/// Lists every active plan with the amount of its next installment.
pub async fn list_pending(
    user: CurrentUser,
    ledger: web::Data<LedgerService>,
) -> Result<HttpResponse> {
    let plans = ledger.list_pending_plans(user.id()).await?;
    Ok(HttpResponse::Ok().json(plans))
}

/// GET /emi/due
///
/// # Query Parameters
/// - `withinDays`: window in days, default 7; overdue plans are always included
pub async fn list_due(
    user: CurrentUser,
    query: web::Query<DueQuery>,
    ledger: web::Data<LedgerService>,
) -> Result<HttpResponse> {
    let within_days = query
        .within_days
        .unwrap_or(DEFAULT_DUE_WINDOW_DAYS)
        .min(MAX_DUE_WINDOW_DAYS);

    let plans = ledger.list_due_plans(user.id(), within_days).await?;
    Ok(HttpResponse::Ok().json(plans))
}

/// GET /emi/plans/{course_id}/history/{txn}
pub async fn plan_history(
    user: CurrentUser,
    path: web::Path<(String, String)>,
    ledger: web::Data<LedgerService>,
) -> Result<HttpResponse> {
    let (course_id, plan_txn) = path.into_inner();
    let history = ledger.plan_history(user.id(), &course_id, &plan_txn).await?;
    Ok(HttpResponse::Ok().json(history))
}

/// DELETE /admin/users/{user_id}/emi/{course_id}/{txn}
///
/// # Returns
/// - 200: number of records removed
/// - 404: no such plan
pub async fn remove_plan(
    path: web::Path<(String, String, String)>,
    ledger: web::Data<LedgerService>,
) -> Result<HttpResponse> {
    let (user_id, course_id, plan_txn) = path.into_inner();
    let removed = ledger.remove_plan(&user_id, &course_id, &plan_txn).await?;
    Ok(HttpResponse::Ok().json(RemovePlanResponse { removed }))
}

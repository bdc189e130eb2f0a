// HTTP handler for EMI plan previews
//
// Endpoints:
// - GET /emi/plans/{course_id}?months=N | ?option=I - Resolve a plan for a course

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::{AppError, Result};
use crate::modules::courses::repositories::CourseRepository;
use crate::modules::plans::models::PlanSelection;
use crate::modules::plans::services::PlanResolver;

#[derive(Debug, Deserialize)]
pub struct PlanQuery {
    pub months: Option<u32>,
    pub option: Option<usize>,
}

impl PlanQuery {
    fn selection(&self) -> Result<PlanSelection> {
        match (self.option, self.months) {
            (Some(index), None) => Ok(PlanSelection::OptionIndex(index)),
            (None, Some(months)) => Ok(PlanSelection::Months(months)),
            (Some(_), Some(_)) => Err(AppError::validation(
                "Specify either 'months' or 'option', not both",
            )),
            (None, None) => Err(AppError::validation("Either 'months' or 'option' is required")),
        }
    }
}

/// GET /emi/plans/{course_id}
///
/// # Returns
/// - 200: Resolved plan with per-month amounts and total payable
/// - 400: Missing or invalid selection
/// - 404: Unknown course
/// - 422: Course not eligible for EMI
pub async fn resolve_plan(
    course_id: web::Path<String>,
    query: web::Query<PlanQuery>,
    courses: web::Data<Arc<dyn CourseRepository>>,
) -> Result<HttpResponse> {
    let selection = query.selection()?;

    let course = courses
        .find_by_id(&course_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Course {}", course_id.as_str())))?;

    let plan = PlanResolver::resolve(&course, selection)?;
    Ok(HttpResponse::Ok().json(plan))
}

// HTTP handlers for offline (cash) EMI plans
//
// Endpoints:
// - POST /admin/offline-emis - Register a plan
// - GET /admin/offline-emis/{id} - Fetch a plan
// - POST /admin/offline-emis/{id}/schedule/{index}/pay - Mark one entry paid

use actix_web::{web, HttpResponse};

use crate::core::Result;
use crate::modules::offline_emi::models::CreateOfflineEmiRequest;
use crate::modules::offline_emi::services::OfflineEmiService;

/// POST /admin/offline-emis
pub async fn create_offline_emi(
    request: web::Json<CreateOfflineEmiRequest>,
    service: web::Data<OfflineEmiService>,
) -> Result<HttpResponse> {
    let emi = service.create(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(emi))
}

/// GET /admin/offline-emis/{id}
pub async fn get_offline_emi(
    id: web::Path<String>,
    service: web::Data<OfflineEmiService>,
) -> Result<HttpResponse> {
    let emi = service.get(&id).await?;
    Ok(HttpResponse::Ok().json(emi))
}

/// POST /admin/offline-emis/{id}/schedule/{index}/pay
///
/// # Returns
/// - 200: Updated plan
/// - 400: Index out of range or entry already paid
/// - 404: Unknown plan
pub async fn mark_offline_installment_paid(
    path: web::Path<(String, usize)>,
    service: web::Data<OfflineEmiService>,
) -> Result<HttpResponse> {
    let (id, index) = path.into_inner();
    let emi = service.mark_installment_paid(&id, index).await?;
    Ok(HttpResponse::Ok().json(emi))
}

// HTTP handlers for invoices
//
// Endpoints:
// - POST /invoices - Raise (or fetch the existing) invoice for a payment
// - GET /invoices/{invoice_number} - Fetch an invoice

use actix_web::{web, HttpResponse};

use crate::core::Result;
use crate::modules::invoices::models::CreateInvoiceRequest;
use crate::modules::invoices::services::InvoiceService;

/// POST /invoices
///
/// # Returns
/// - 201: Invoice issued by this request
/// - 200: Invoice already existed for the transaction and admission form
/// - 400: Invalid request
/// - 409: Numbering conflict persisted across retries
pub async fn create_invoice(
    request: web::Json<CreateInvoiceRequest>,
    service: web::Data<InvoiceService>,
) -> Result<HttpResponse> {
    let issued = service.create_invoice(request.into_inner()).await?;

    if issued.created {
        Ok(HttpResponse::Created().json(issued.invoice))
    } else {
        Ok(HttpResponse::Ok().json(issued.invoice))
    }
}

/// GET /invoices/{invoice_number}
pub async fn get_invoice(
    invoice_number: web::Path<String>,
    service: web::Data<InvoiceService>,
) -> Result<HttpResponse> {
    let invoice = service.get_invoice(&invoice_number).await?;
    Ok(HttpResponse::Ok().json(invoice))
}

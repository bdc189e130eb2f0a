//! EMI Ledger Service Library
//!
//! Installment (EMI) subsystem of a course-selling LMS: GST splitting,
//! invoice numbering, plan resolution, the installment ledger and gateway
//! reconciliation.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

use std::sync::Arc;

use actix_web::web;

use crate::middleware::UserIdentity;
use crate::modules::courses::CourseRepository;
use crate::modules::health::controllers::health_controller;
use crate::modules::invoices::controllers::invoice_controller;
use crate::modules::invoices::InvoiceService;
use crate::modules::ledger::controllers::ledger_controller;
use crate::modules::ledger::LedgerService;
use crate::modules::offline_emi::controllers::offline_emi_controller;
use crate::modules::offline_emi::OfflineEmiService;
use crate::modules::plans::controllers::plan_controller;
use crate::modules::reconciliation::controllers::emi_controller::{self, RedirectPages};
use crate::modules::reconciliation::ReconciliationService;

// Re-export commonly used types
pub use modules::invoices;
pub use modules::ledger;
pub use modules::reconciliation;
pub use modules::taxes;

/// Shared services handed to every worker
#[derive(Clone)]
pub struct AppState {
    pub courses: Arc<dyn CourseRepository>,
    pub ledger: Arc<LedgerService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub invoices: Arc<InvoiceService>,
    pub offline_emis: Arc<OfflineEmiService>,
    pub redirect_pages: RedirectPages,
}

/// Register application data and every route
pub fn configure_app(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.app_data(web::Data::new(state.courses.clone()))
        .app_data(web::Data::from(state.ledger.clone()))
        .app_data(web::Data::from(state.reconciliation.clone()))
        .app_data(web::Data::from(state.invoices.clone()))
        .app_data(web::Data::from(state.offline_emis.clone()))
        .app_data(web::Data::new(state.redirect_pages.clone()))
        .configure(health_controller::configure)
        .service(
            web::scope("/emi")
                .service(
                    web::resource("/pay")
                        .wrap(UserIdentity)
                        .route(web::get().to(ledger_controller::list_pending))
                        .route(web::post().to(emi_controller::pay_installment)),
                )
                .service(
                    web::resource("/due")
                        .wrap(UserIdentity)
                        .route(web::get().to(ledger_controller::list_due)),
                )
                .service(
                    web::resource("/plans/{course_id}/history/{txn}")
                        .wrap(UserIdentity)
                        .route(web::get().to(ledger_controller::plan_history)),
                )
                .route("/plans/{course_id}", web::get().to(plan_controller::resolve_plan))
                .route("/callback", web::get().to(emi_controller::gateway_callback))
                .route("/webhook", web::post().to(emi_controller::gateway_webhook)),
        )
        .service(
            web::scope("/invoices")
                .route("", web::post().to(invoice_controller::create_invoice))
                .route("/{invoice_number}", web::get().to(invoice_controller::get_invoice)),
        )
        .service(
            web::scope("/admin")
                .route(
                    "/offline-emis",
                    web::post().to(offline_emi_controller::create_offline_emi),
                )
                .route(
                    "/offline-emis/{id}",
                    web::get().to(offline_emi_controller::get_offline_emi),
                )
                .route(
                    "/offline-emis/{id}/schedule/{index}/pay",
                    web::post().to(offline_emi_controller::mark_offline_installment_paid),
                )
                .route(
                    "/users/{user_id}/emi/{course_id}/{txn}",
                    web::delete().to(ledger_controller::remove_plan),
                ),
        );
}

pub mod attempt_expiry;
pub mod reconciliation_service;

pub use attempt_expiry::AttemptExpirySweeper;
pub use reconciliation_service::{
    build_callback_url, CallbackOutcome, CallbackParams, PaymentInitiation, ReconciliationService,
    ReconciliationSettings,
};

pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use controllers::RedirectPages;
pub use models::{AttemptStatus, PaymentAttempt};
pub use repositories::{AttemptRepository, InMemoryAttemptRepository, MySqlAttemptRepository};
pub use services::{
    AttemptExpirySweeper, CallbackOutcome, CallbackParams, PaymentInitiation,
    ReconciliationService, ReconciliationSettings,
};

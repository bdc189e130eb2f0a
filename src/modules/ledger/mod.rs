pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{DuePlan, PlanStatus, PurchaseRecord};
pub use repositories::{InMemoryLedgerRepository, LedgerRepository, MySqlLedgerRepository};
pub use services::LedgerService;

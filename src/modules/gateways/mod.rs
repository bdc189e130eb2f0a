pub mod models;
pub mod services;

pub use models::{ChargeMetadata, ChargeSession, ChargeState, ChargeStatus};
pub use services::{PaymentGateway, PhonePeClient};

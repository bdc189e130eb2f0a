pub mod gateway_trait;
pub mod phonepe;
pub mod webhook;

pub use gateway_trait::PaymentGateway;
pub use phonepe::PhonePeClient;
pub use webhook::{parse_notification, verify_authorization, WebhookNotification};

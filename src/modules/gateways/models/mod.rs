pub mod charge;

pub use charge::{ChargeMetadata, ChargeSession, ChargeState, ChargeStatus};

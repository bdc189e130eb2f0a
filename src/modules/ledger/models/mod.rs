pub mod purchase_record;

pub use purchase_record::{DuePlan, InstallmentApplied, InstallmentPayment, PlanStatus, PurchaseRecord};
